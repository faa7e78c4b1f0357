//! # cs2star converter
//!
//! Command-line tool for converting a cryoSPARC job directory into
//! RELION-ready STAR files.
//!
//! ## Usage
//!
//! ```bash
//! # Convert a job into the current directory
//! cs2star P12/J42
//!
//! # Convert into a fresh directory, keeping classes 2 and 5 only
//! cs2star P12/J42 relion/import --classes 2,5
//! ```
//!
//! The tool writes `particles.star`, `micrographs.star` and
//! `micrograph_map.tsv` (the raw-to-rewritten micrograph reference map,
//! for whatever copies or links the image data into place).

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use cs2star::convert::{convert_job, ConvertOptions};
use cs2star::jobtree::resolve_job;

/// cs2star - convert a cryoSPARC job into RELION STAR tables
#[derive(Parser)]
#[command(name = "cs2star")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source job directory containing particle record files
    #[arg(value_name = "JOB_DIR")]
    job_dir: PathBuf,

    /// Destination directory for the converted tables
    #[arg(value_name = "DEST_DIR", default_value = ".")]
    dest_dir: PathBuf,

    /// Only keep particles from these classes (1-based destination
    /// numbering, comma-separated)
    #[arg(long, value_delimiter = ',')]
    classes: Vec<i64>,

    /// Only use these splits of a particle-sets job (comma-separated)
    #[arg(long, value_delimiter = ',')]
    sets: Vec<u32>,

    /// Keep the source X/Y axis roles instead of swapping them
    ///
    /// Swapping is on by default because that is usually the convention
    /// change between the two pipelines; check your data either way.
    #[arg(long)]
    no_swapxy: bool,

    /// Extension given to rewritten micrograph references
    #[arg(long, default_value = "mrcs")]
    micrograph_ext: String,

    /// Relative tolerance when checking per-micrograph metadata
    /// consistency (integers always compare exactly)
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,

    /// Overwrite existing output files
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Resolve and report without writing anything
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let options = ConvertOptions {
        classes: non_empty_set(&cli.classes),
        sets: non_empty_set(&cli.sets),
        swap_xy: !cli.no_swapxy,
        micrograph_ext: cli.micrograph_ext.clone(),
        tolerance: cli.tolerance,
    };

    let particles_star = cli.dest_dir.join("particles.star");
    let micrographs_star = cli.dest_dir.join("micrographs.star");
    let map_tsv = cli.dest_dir.join("micrograph_map.tsv");

    if cli.dry_run {
        let resolved = resolve_job(&cli.job_dir, options.sets.as_ref())?;
        println!("job {} resolves to:", resolved.target);
        for (i, chain) in resolved.chains.iter().enumerate() {
            println!("  particle set {}:", i + 1);
            for file in chain.files() {
                println!("    {}", file.display());
            }
        }
        println!("would create:");
        for path in [&particles_star, &micrographs_star, &map_tsv] {
            println!("  {}", path.display());
        }
        return Ok(());
    }

    if !cli.overwrite {
        for path in [&particles_star, &micrographs_star, &map_tsv] {
            if path.exists() {
                bail!(
                    "{} already exists; pass -f to overwrite",
                    path.display()
                );
            }
        }
    }

    let conversion = convert_job(&cli.job_dir, &options).context("conversion failed")?;

    fs::create_dir_all(&cli.dest_dir)
        .with_context(|| format!("creating {}", cli.dest_dir.display()))?;

    write_table(&particles_star, &conversion.particles)?;
    write_table(&micrographs_star, &conversion.micrographs)?;
    write_map(&map_tsv, &conversion.rewrite_map)?;

    let stats = conversion.stats;
    info!(
        "wrote {} particle(s) and {} micrograph(s) from {} file(s) in {} set(s)",
        stats.particles, stats.micrographs, stats.files_merged, stats.chains
    );
    if stats.skipped_records > 0 {
        info!(
            "{} record(s) were skipped during merging (no matching base uid)",
            stats.skipped_records
        );
    }
    if stats.dropped_by_class > 0 {
        info!("{} particle(s) dropped by class selection", stats.dropped_by_class);
    }
    println!("Output written to {}", cli.dest_dir.display());

    Ok(())
}

fn non_empty_set<T: Ord + Copy>(items: &[T]) -> Option<BTreeSet<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items.iter().copied().collect())
    }
}

fn write_table(path: &Path, table: &cs2star::star::StarTable) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    table
        .write_to(&mut writer)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn write_map(path: &Path, map: &cs2star::micrograph::RewriteMap) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for (raw, rewritten) in map.iter() {
        writeln!(writer, "{}\t{}", raw, rewritten)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
