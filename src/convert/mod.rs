//! # Conversion pipeline
//!
//! Wires the stages together: resolve the job's file chain(s), merge
//! each chain, concatenate disjoint particle sets, map into the
//! destination vocabulary, filter classes, and derive the micrograph
//! table plus the reference rewrite map. Every stage is a pure
//! in-memory transform; nothing here touches the destination
//! directory, so a failed conversion can never leave partial output.

use std::collections::BTreeSet;
use std::path::Path;

use log::info;

use crate::jobtree::{self, JobTreeError};
use crate::mapping::{self, MapError};
use crate::merge::{self, MergedTable, MergeError};
use crate::micrograph::{self, DeriveError, RewriteMap};
use crate::star::StarTable;

/// Configuration consumed by the conversion core
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Keep only these destination-space (1-based) class numbers
    pub classes: Option<BTreeSet<i64>>,
    /// Use only these splits of a particle-sets job
    pub sets: Option<BTreeSet<u32>>,
    /// Exchange the X/Y axis roles in coordinates and in-plane angles
    pub swap_xy: bool,
    /// Extension given to rewritten micrograph references
    pub micrograph_ext: String,
    /// Relative tolerance for image metadata consistency checks
    pub tolerance: f64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            classes: None,
            sets: None,
            // usually the convention change between the two pipelines
            swap_xy: true,
            micrograph_ext: "mrcs".to_string(),
            tolerance: 1e-6,
        }
    }
}

/// Counters accumulated over one conversion
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertStats {
    /// Particle sets (chains) resolved
    pub chains: usize,
    /// Record files merged across all chains
    pub files_merged: usize,
    /// Merge rows skipped for lack of a matching base uid
    pub skipped_records: u64,
    /// Particles dropped by class selection
    pub dropped_by_class: usize,
    /// Particles in the final table
    pub particles: usize,
    /// Unique micrographs in the derived table
    pub micrographs: usize,
}

/// The finished in-memory conversion, ready for the I/O layer
#[derive(Debug)]
pub struct Conversion {
    /// Destination particle table
    pub particles: StarTable,
    /// Derived micrograph table
    pub micrographs: StarTable,
    /// Raw-to-rewritten micrograph reference map
    pub rewrite_map: RewriteMap,
    /// Counters for reporting
    pub stats: ConvertStats,
}

/// Errors from any stage of the pipeline
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Job-tree resolution failed
    #[error(transparent)]
    JobTree(#[from] JobTreeError),

    /// Chain merging failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Field mapping failed
    #[error(transparent)]
    Map(#[from] MapError),

    /// Micrograph derivation failed
    #[error(transparent)]
    Derive(#[from] DeriveError),
}

/// Convert one job's particles into the destination tables
pub fn convert_job(job_dir: &Path, options: &ConvertOptions) -> Result<Conversion, ConvertError> {
    let resolved = jobtree::resolve_job(job_dir, options.sets.as_ref())?;

    let mut stats = ConvertStats {
        chains: resolved.chains.len(),
        ..Default::default()
    };

    let mut merged: Option<MergedTable> = None;
    for chain in &resolved.chains {
        let (table, chain_stats) = merge::merge_chain(chain)?;
        stats.files_merged += chain_stats.files_merged;
        stats.skipped_records += chain_stats.skipped;
        match merged.as_mut() {
            None => merged = Some(table),
            Some(all) => all.append(table),
        }
    }
    let merged = merged.ok_or(MergeError::EmptyChain)?;

    let mut particles = mapping::map_particles(&merged, options.swap_xy)?;
    if let Some(classes) = &options.classes {
        stats.dropped_by_class = mapping::select_classes(&mut particles, classes)?;
    }

    let (micrographs, rewrite_map) = micrograph::derive_micrographs(
        &mut particles,
        &options.micrograph_ext,
        options.tolerance,
    )?;

    stats.particles = particles.len();
    stats.micrographs = micrographs.len();
    info!(
        "job {} converted: {} particle(s) over {} micrograph(s)",
        resolved.target, stats.particles, stats.micrographs
    );

    Ok(Conversion {
        particles,
        micrographs,
        rewrite_map,
        stats,
    })
}
