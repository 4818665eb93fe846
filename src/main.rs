//! Disk-image utility.
//!
//! Operates on a raw disk image the way the kernel would: format it,
//! copy host files in, list, print and remove files. The image is
//! loaded into the in-memory disk, operated on through the real file
//! system, and written back out.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use pampero::fs::{FileSystem, SynchDisk};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "Disk-image utility for the pampero file system")]
struct Cli {
    /// Path of the disk image to operate on.
    #[arg(long, default_value = "DISK")]
    image: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the image with an empty file system.
    Format,
    /// List the files in the image.
    Ls,
    /// Copy a host file into the image.
    Cp {
        /// Host file to copy from.
        from: PathBuf,
        /// Name to create inside the image.
        to: String,
    },
    /// Print the contents of a file in the image.
    Print {
        /// Name of the file to print.
        name: String,
    },
    /// Remove a file from the image.
    Rm {
        /// Name of the file to remove.
        name: String,
    },
    /// Verify the consistency of the image's on-disk structures.
    Check,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let (disk, format) = match &cli.command {
        Command::Format => (Arc::new(SynchDisk::new()), true),
        _ => {
            let image = std::fs::read(&cli.image)
                .with_context(|| format!("cannot read disk image {}", cli.image.display()))?;
            (Arc::new(SynchDisk::from_image(image)), false)
        }
    };
    let fs = FileSystem::new(Arc::clone(&disk), format);

    let mut dirty = format;
    match cli.command {
        Command::Format => {}
        Command::Ls => {
            for name in fs.list() {
                println!("{name}");
            }
        }
        Command::Cp { from, to } => {
            let bytes = std::fs::read(&from)
                .with_context(|| format!("cannot read {}", from.display()))?;
            fs.create(&to, 0)
                .with_context(|| format!("cannot create {to}"))?;
            let file = fs.open(&to).with_context(|| format!("cannot open {to}"))?;
            let written = file.write(&bytes);
            if written != bytes.len() {
                bail!("short write: {written} of {} bytes", bytes.len());
            }
            dirty = true;
        }
        Command::Print { name } => {
            let file = fs.open(&name).with_context(|| format!("cannot open {name}"))?;
            let mut contents = vec![0u8; file.length()];
            file.read(&mut contents);
            use std::io::Write;
            std::io::stdout().write_all(&contents)?;
        }
        Command::Rm { name } => {
            fs.remove(&name)
                .with_context(|| format!("cannot remove {name}"))?;
            dirty = true;
        }
        Command::Check => {
            if !fs.check() {
                bail!("file system is inconsistent");
            }
            println!("file system is consistent");
        }
    }

    if dirty {
        std::fs::write(&cli.image, disk.image())
            .with_context(|| format!("cannot write disk image {}", cli.image.display()))?;
    }
    Ok(())
}
