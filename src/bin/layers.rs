use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use twenty48::builder::ModelManifest;
use twenty48::engine::State;
use twenty48::layers::{LayerFolder, LayerPartKey, PartFile};
use twenty48::serialization::decode_states;

#[derive(Debug, Parser)]
#[command(name = "layers", about = "Inspect and validate a layer model folder")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Per-layer state and byte counts
    Stats {
        folder: PathBuf,
        /// Also print every part
        #[arg(short, long)]
        verbose: bool,
    },
    /// Check checksums, ordering and part membership of every state
    Validate { folder: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.cmd {
        Cmd::Stats { folder, verbose } => stats(&LayerFolder::new(folder), verbose),
        Cmd::Validate { folder } => {
            let folder = LayerFolder::new(folder);
            let manifest = ModelManifest::read(folder.path())
                .with_context(|| format!("reading model manifest in {}", folder.path().display()))?;
            match manifest.model.board_size {
                2 => validate::<2>(&folder),
                3 => validate::<3>(&folder),
                4 => validate::<4>(&folder),
                n => bail!("unsupported board size {}", n),
            }
        }
    }
}

fn stats(folder: &LayerFolder, verbose: bool) -> Result<()> {
    let mut total_states = 0u64;
    let mut total_bytes = 0u64;
    println!("{:>6} {:>6} {:>14} {:>14}", "sum", "parts", "states", "bytes");
    for sum in folder.layer_sums()? {
        let mut states = 0u64;
        let mut bytes = 0u64;
        let parts = folder.parts_with_sum(sum)?;
        for &part in &parts {
            let info = folder.read_info(part)?;
            if verbose {
                println!("  {:<24} {:>14} {:>14}", part.file_name(PartFile::States), info.num_states, info.num_bytes);
            }
            states += info.num_states;
            bytes += info.num_bytes;
        }
        println!("{:>6} {:>6} {:>14} {:>14}", sum, parts.len(), states, bytes);
        total_states += states;
        total_bytes += bytes;
    }
    let bits = if total_states == 0 { 0.0 } else { 8.0 * total_bytes as f64 / total_states as f64 };
    println!("total: {} states in {} bytes ({:.2} bits/state)", total_states, total_bytes, bits);

    let fragments = folder.fragments()?.len();
    let tranches = folder.tranches()?.len();
    if fragments > 0 || tranches > 0 {
        println!("pending: {} fragments, {} tranche manifests", fragments, tranches);
    }
    Ok(())
}

fn validate<const N: usize>(folder: &LayerFolder) -> Result<()> {
    let parts = folder.parts(PartFile::States)?;
    let pb = ProgressBar::new(parts.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let mut failures = 0usize;
    for part in parts {
        pb.set_message(part.file_name(PartFile::States));
        if let Err(e) = validate_part::<N>(folder, part) {
            pb.suspend(|| eprintln!("{}: {:#}", part.file_name(PartFile::States), e));
            failures += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    if failures > 0 {
        bail!("{} invalid parts", failures);
    }
    println!("all parts valid");
    Ok(())
}

fn validate_part<const N: usize>(folder: &LayerFolder, part: LayerPartKey) -> Result<()> {
    let info = folder.read_info(part)?;
    let bytes = fs::read(folder.part_path(part, PartFile::States))?;
    info.verify(&bytes)?;
    let states = decode_states(&bytes)?;
    if states.len() as u64 != info.num_states {
        bail!("{} states decoded, metadata says {}", states.len(), info.num_states);
    }
    for &raw in &states {
        let state = State::<N>::from_raw(raw);
        if LayerPartKey::of(state) != part {
            bail!("state {:#x} belongs to {:?}", raw, LayerPartKey::of(state));
        }
        if state.canonicalize() != state {
            bail!("state {:#x} is not canonical", raw);
        }
    }
    Ok(())
}
