//! # Job-tree resolution
//!
//! A processing job rarely carries all of its particle metadata itself:
//! fields are split between a *primary* record file (freshly computed by
//! the job) and a *passthrough* file (fields inherited from upstream),
//! and either may live in an ancestor job's directory instead. The
//! resolver walks the parent references declared in `job.json` and
//! returns, per particle set, the ordered chain of files the merger has
//! to combine.
//!
//! Chain ordering is the merge precedence: most-upstream file first,
//! and within one job the passthrough file before the primary, so a
//! job's freshly computed fields always win over passed-through copies.
//!
//! Cycles in the parent graph are detected with an explicit visit stack
//! keyed by canonical job path, never by pointer identity.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

mod metadata;

#[cfg(test)]
mod tests;

pub use metadata::{JobDocument, OutputResult};

/// Filename fragments that mark outputs we never convert
const EXCLUDED_NAMES: [&str; 5] = [
    "excluded",
    "incomplete",
    "remainder",
    "rejected",
    "uncategorized",
];

/// Errors that can occur while resolving a job's file chain
#[derive(Debug, thiserror::Error)]
pub enum JobTreeError {
    /// A job transitively references itself
    #[error("cyclic job reference: {}", .cycle.join(" -> "))]
    CyclicJobReference {
        /// Job names along the cycle, first repeated last
        cycle: Vec<String>,
    },

    /// An upstream reference names a job that cannot be read
    #[error("upstream job {path} is missing or has no readable metadata")]
    MissingUpstreamJob {
        /// The referenced job directory
        path: PathBuf,
    },

    /// The target of the conversion is not a usable job directory
    #[error("{path} is not a readable job directory: {reason}")]
    InvalidJobDirectory {
        /// The offending directory
        path: PathBuf,
        /// What went wrong reading its metadata
        reason: String,
    },

    /// Resolution finished without finding any primary particle file
    #[error("no usable particle metadata files found for job {job}")]
    NoParticleFiles {
        /// Target job name
        job: String,
    },
}

/// The ordered file chain for one particle set, base first
#[derive(Debug, Clone)]
pub struct SourceChain {
    files: Vec<PathBuf>,
}

impl SourceChain {
    /// Files in merge order (most upstream first)
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Number of files in the chain
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Everything the resolver learned about the target job
#[derive(Debug)]
pub struct ResolvedJob {
    /// Target job name (directory name)
    pub target: String,
    /// One chain per particle set; exactly one for non-split jobs
    pub chains: Vec<SourceChain>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Passthrough,
    Primary,
}

#[derive(Debug)]
struct FoundFile {
    path: PathBuf,
    depth: usize,
    role: Role,
    split: Option<u32>,
}

/// Resolve the chain of record files needed to describe the particles
/// of `job_dir`, following parent references as far as necessary.
///
/// `sets` restricts which splits of a particle-sets job are taken; it
/// has no effect on other job types.
pub fn resolve_job(
    job_dir: &Path,
    sets: Option<&BTreeSet<u32>>,
) -> Result<ResolvedJob, JobTreeError> {
    let target = job_name(job_dir);
    let mut resolver = Resolver {
        sets,
        files: Vec::new(),
        stack: Vec::new(),
    };
    resolver.walk(job_dir, 0)?;

    let chains = assemble_chains(resolver.files);
    if chains.is_empty() {
        return Err(JobTreeError::NoParticleFiles { job: target });
    }
    info!(
        "resolved job {}: {} particle set(s), {} file(s) total",
        target,
        chains.len(),
        chains.iter().map(SourceChain::len).sum::<usize>()
    );
    Ok(ResolvedJob { target, chains })
}

struct Resolver<'a> {
    sets: Option<&'a BTreeSet<u32>>,
    files: Vec<FoundFile>,
    /// (canonical path, job name) of every job on the current walk
    stack: Vec<(PathBuf, String)>,
}

impl Resolver<'_> {
    fn walk(&mut self, dir: &Path, depth: usize) -> Result<(), JobTreeError> {
        let name = job_name(dir);
        let key = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        if let Some(first) = self.stack.iter().position(|(k, _)| *k == key) {
            let mut cycle: Vec<String> =
                self.stack[first..].iter().map(|(_, n)| n.clone()).collect();
            cycle.push(name);
            return Err(JobTreeError::CyclicJobReference { cycle });
        }

        let doc = match JobDocument::read(dir) {
            Ok(doc) => doc,
            Err(reason) if depth == 0 => {
                return Err(JobTreeError::InvalidJobDirectory {
                    path: dir.to_path_buf(),
                    reason,
                })
            }
            Err(_) => {
                return Err(JobTreeError::MissingUpstreamJob {
                    path: dir.to_path_buf(),
                })
            }
        };

        self.collect_outputs(dir, &doc, depth);
        if self.filled() {
            return Ok(());
        }

        self.stack.push((key, name));
        for parent in &doc.parents {
            let parent_dir = project_dir(dir).join(parent);
            self.walk(&parent_dir, depth + 1)?;
            if self.filled() {
                break;
            }
        }
        self.stack.pop();
        Ok(())
    }

    /// Both slots satisfied; nothing left to look for upstream
    fn filled(&self) -> bool {
        self.has_role(Role::Primary) && self.has_role(Role::Passthrough)
    }

    fn has_role(&self, role: Role) -> bool {
        self.files.iter().any(|f| f.role == role)
    }

    fn collect_outputs(&mut self, dir: &Path, doc: &JobDocument, depth: usize) {
        // snapshot before this job contributes, so one job can add
        // several files to a still-open slot without gating itself
        let want_primary = !self.has_role(Role::Primary);
        let want_passthrough = !self.has_role(Role::Passthrough);
        match doc.job_type.as_str() {
            // the "good" primary output is split into one file per class
            "hetero_refine" => {
                for output in &doc.output_results {
                    let (role, wanted) = if output.passthrough {
                        (
                            Role::Passthrough,
                            want_passthrough && output.group_name == "particles_all_classes",
                        )
                    } else {
                        (
                            Role::Primary,
                            want_primary && output.group_name.contains("particles_class_"),
                        )
                    };
                    if wanted {
                        if let Some(file) = output.metafiles.last() {
                            self.add_file(dir, file, depth, role, None);
                        }
                    }
                }
            }
            "particle_sets" => {
                for output in &doc.output_results {
                    let Some(split) = split_number(&output.group_name) else {
                        continue;
                    };
                    if let Some(allowed) = self.sets {
                        if !allowed.contains(&split) {
                            continue;
                        }
                    }
                    let (role, wanted) = if output.passthrough {
                        (Role::Passthrough, want_passthrough)
                    } else {
                        (Role::Primary, want_primary)
                    };
                    if wanted {
                        if let Some(file) = output.metafiles.last() {
                            self.add_file(dir, file, depth, role, Some(split));
                        }
                    }
                }
            }
            // every remaining job type is covered by the generic rules
            _ => {
                for (role, wanted) in [
                    (Role::Passthrough, want_passthrough),
                    (Role::Primary, want_primary),
                ] {
                    if !wanted {
                        continue;
                    }
                    let mut candidates: Vec<&str> = doc
                        .output_results
                        .iter()
                        .filter(|o| o.passthrough == (role == Role::Passthrough))
                        .flat_map(|o| o.metafiles.iter())
                        .map(String::as_str)
                        .filter(|f| f.contains("particles") || f.contains("split_"))
                        .filter(|f| !EXCLUDED_NAMES.iter().any(|bad| f.contains(bad)))
                        .collect();
                    candidates.sort_unstable();
                    if let Some(file) = candidates.last() {
                        self.add_file(dir, file, depth, role, None);
                    }
                }
            }
        }
    }

    fn add_file(&mut self, dir: &Path, file: &str, depth: usize, role: Role, split: Option<u32>) {
        let path = project_dir(dir).join(file);
        if !path.is_file() {
            warn!(
                "job {} lists metadata file {} which does not exist; skipping it",
                job_name(dir),
                path.display()
            );
            return;
        }
        self.files.push(FoundFile {
            path,
            depth,
            role,
            split,
        });
    }
}

fn assemble_chains(mut files: Vec<FoundFile>) -> Vec<SourceChain> {
    // upstream first; within a job, passthrough before primary
    files.sort_by(|a, b| {
        b.depth
            .cmp(&a.depth)
            .then(a.role.cmp(&b.role))
            .then(a.path.cmp(&b.path))
    });

    let split_ids: BTreeSet<u32> = files.iter().filter_map(|f| f.split).collect();
    if split_ids.is_empty() {
        if !files.iter().any(|f| f.role == Role::Primary) {
            return Vec::new();
        }
        return vec![SourceChain {
            files: files.into_iter().map(|f| f.path).collect(),
        }];
    }

    let mut chains = Vec::new();
    for id in split_ids {
        let chain: Vec<PathBuf> = files
            .iter()
            .filter(|f| f.split.is_none() || f.split == Some(id))
            .map(|f| f.path.clone())
            .collect();
        let has_primary = files
            .iter()
            .any(|f| f.role == Role::Primary && (f.split.is_none() || f.split == Some(id)));
        if has_primary {
            chains.push(SourceChain { files: chain });
        }
    }
    chains
}

/// Extract `N` from a group name containing `split_N`
fn split_number(group_name: &str) -> Option<u32> {
    let rest = &group_name[group_name.find("split_")? + "split_".len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn job_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// The project directory a job's metafile paths are relative to
fn project_dir(job_dir: &Path) -> PathBuf {
    job_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
