#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rext4_core::Ext4Fs;
use rext4_fuse::MountOptions;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "rext4", about = "Read-only ext4 image reader")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a file from the image to standard output.
    Cat {
        /// Path to the filesystem image.
        image: PathBuf,
        /// Absolute path of the file inside the image.
        path: String,
    },
    /// Mount an image via FUSE (read-only, blocks until unmounted).
    Mount {
        /// Mountpoint directory.
        mountpoint: PathBuf,
        /// Path to the filesystem image.
        image: PathBuf,
        /// Allow other users to access the mount.
        #[arg(long)]
        allow_other: bool,
    },
    /// Print a superblock summary.
    Inspect {
        /// Path to the filesystem image.
        image: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
}

// ── Serializable outputs ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InspectOutput {
    block_size: u32,
    inode_size: u16,
    inodes_count: u32,
    blocks_count: u64,
    inodes_per_group: u32,
    free_blocks: u64,
    free_inodes: u32,
    volume_name: String,
    uuid: String,
    feature_incompat: u32,
    checksum_type: u8,
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Cat { image, path } => cat(&image, &path),
        Command::Mount {
            mountpoint,
            image,
            allow_other,
        } => mount_cmd(&image, &mountpoint, allow_other),
        Command::Inspect { image, json } => inspect(&image, json),
    }
}

fn open_image(image: &PathBuf) -> Result<Ext4Fs> {
    Ext4Fs::open_path(image)
        .with_context(|| format!("failed to open ext4 image: {}", image.display()))
}

fn cat(image: &PathBuf, path: &str) -> Result<()> {
    let fs = open_image(image)?;
    let (_, inode) = fs
        .resolve(path)
        .with_context(|| format!("failed to resolve {path}"))?;

    let volume = fs.volume();
    let mut stream = rext4_core::InodeStream::new(volume, inode);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let chunk = stream.read(64 * 1024).context("read failed")?;
        if chunk.is_empty() {
            break;
        }
        out.write_all(&chunk).context("write to stdout failed")?;
    }
    out.flush().context("flush stdout failed")?;
    Ok(())
}

fn mount_cmd(image: &PathBuf, mountpoint: &PathBuf, allow_other: bool) -> Result<()> {
    let fs = open_image(image)?;
    let sb = fs.volume().superblock();
    eprintln!(
        "Mounting ext4 image (block_size={}, blocks={}) at {}",
        sb.block_size,
        sb.blocks_count,
        mountpoint.display()
    );

    let options = MountOptions {
        allow_other,
        auto_unmount: true,
    };
    rext4_fuse::mount(Box::new(fs), mountpoint, &options)
        .with_context(|| format!("failed to mount at {}", mountpoint.display()))?;
    Ok(())
}

fn inspect(image: &PathBuf, json: bool) -> Result<()> {
    let fs = open_image(image)?;
    let sb = fs.volume().superblock();

    let uuid_hex: String = sb.uuid.iter().map(|b| format!("{b:02x}")).collect();
    let output = InspectOutput {
        block_size: sb.block_size.get(),
        inode_size: sb.inode_size,
        inodes_count: sb.inodes_count,
        blocks_count: sb.blocks_count,
        inodes_per_group: sb.inodes_per_group,
        free_blocks: sb.free_blocks_count,
        free_inodes: sb.free_inodes_count,
        volume_name: sb.volume_name.clone(),
        uuid: uuid_hex,
        feature_incompat: sb.feature_incompat,
        checksum_type: sb.checksum_type,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    } else {
        println!("block_size: {}", output.block_size);
        println!("inode_size: {}", output.inode_size);
        println!("inodes_count: {}", output.inodes_count);
        println!("blocks_count: {}", output.blocks_count);
        println!("inodes_per_group: {}", output.inodes_per_group);
        println!("free_blocks: {}", output.free_blocks);
        println!("free_inodes: {}", output.free_inodes);
        println!("volume_name: {}", output.volume_name);
        println!("uuid: {}", output.uuid);
        println!("feature_incompat: {:#x}", output.feature_incompat);
        println!("checksum_type: {}", output.checksum_type);
    }

    Ok(())
}
