use anyhow::{bail, Context, Result};
use blobchain_core::{check_genesis, constants::DEFAULT_DIFFICULTY, BlobMessage, Block, Chain};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "blobchain")]
#[command(about = "Mine and inspect blob chains")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the genesis parameters and print the genesis block
    Genesis,
    /// Mine blobs into new blocks and write the encoded chain
    Mine {
        /// Leading zero bits required of each new block
        #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: u32,
        /// Blob payload; repeat for several
        #[arg(long = "blob", required = true)]
        blobs: Vec<String>,
        /// Blobs per block
        #[arg(long, default_value_t = 8)]
        per_block: usize,
        /// Existing full chain to extend
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to write the chain
        #[arg(long)]
        out: PathBuf,
        /// Write headers only
        #[arg(long)]
        headers_only: bool,
    },
    /// Decode a chain file and report on it
    Inspect {
        #[arg(long)]
        input: PathBuf,
        /// The file was written with --headers-only
        #[arg(long)]
        headers_only: bool,
    },
}

#[derive(Serialize)]
struct GenesisInfo {
    hash: String,
    difficulty: u32,
    nonce: u64,
    cost: String,
}

#[derive(Serialize)]
struct ChainReport {
    length: usize,
    cost: String,
    valid: bool,
    complete: bool,
    bodiless: Vec<usize>,
    tip: String,
    distinct_blobs: usize,
}

fn read_chain(path: &PathBuf, has_bodies: bool) -> Result<Chain> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Chain::decode(&bytes, has_bodies).with_context(|| format!("decoding {}", path.display()))
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Genesis => {
            check_genesis()?;
            let genesis = Block::genesis();
            let out = GenesisInfo {
                hash: hex::encode(genesis.hash()),
                difficulty: genesis.difficulty(),
                nonce: genesis.nonce(),
                cost: genesis.cost().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Mine {
            difficulty,
            blobs,
            per_block,
            input,
            out,
            headers_only,
        } => {
            check_genesis()?;
            if per_block == 0 {
                bail!("--per-block must be at least 1");
            }
            let mut chain = match input {
                Some(path) => read_chain(&path, true)?,
                None => Chain::new(),
            };
            for batch in blobs.chunks(per_block) {
                let wrapped = batch
                    .iter()
                    .map(|b| BlobMessage::new(b.as_bytes().to_vec()).encode());
                let block = chain.next(difficulty, wrapped);
                chain.add(block);
            }
            fs::write(&out, chain.encode(!headers_only))
                .with_context(|| format!("writing {}", out.display()))?;
            info!(
                "wrote {} blocks (cost {}) to {}",
                chain.len(),
                chain.cost(),
                out.display()
            );
        }
        Command::Inspect {
            input,
            headers_only,
        } => {
            let chain = read_chain(&input, !headers_only)?;
            let report = ChainReport {
                length: chain.len(),
                cost: chain.cost().to_string(),
                valid: chain.is_valid(),
                complete: chain.is_complete(),
                bodiless: chain.bodiless_indices(),
                tip: hex::encode(chain.tip().hash()),
                distinct_blobs: chain.mined_blobs().len(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
