//! `job.json` sidecar model.

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The per-job metadata sidecar, as written by the upstream pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct JobDocument {
    /// Job type tag, e.g. `extract_micrographs` or `hetero_refine`
    #[serde(rename = "type")]
    pub job_type: String,

    /// Directory names of the jobs this job inherits fields from
    #[serde(default)]
    pub parents: Vec<String>,

    /// Declared output slots
    #[serde(default)]
    pub output_results: Vec<OutputResult>,
}

/// One declared output slot of a job
#[derive(Debug, Clone, Deserialize)]
pub struct OutputResult {
    /// Output group name, e.g. `particles` or `split_0`
    #[serde(default)]
    pub group_name: String,

    /// Record files for this slot, project-relative, oldest first
    #[serde(default)]
    pub metafiles: Vec<String>,

    /// Whether this slot carries fields passed through from upstream
    #[serde(default)]
    pub passthrough: bool,
}

impl JobDocument {
    /// Read and parse `<dir>/job.json`. Errors are plain reasons; the
    /// caller decides whether the job was the target or an upstream
    /// reference.
    pub fn read(dir: &Path) -> Result<Self, String> {
        let path = dir.join("job.json");
        let text = fs::read_to_string(&path).map_err(|e| e.to_string())?;
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }
}
