//! # cs2star - cryoSPARC to RELION metadata conversion
//!
//! `cs2star` turns the particle metadata of a cryoSPARC processing job
//! into RELION-ready STAR tables. A job's fields are scattered across a
//! chain of binary record files (the job's own output plus passthrough
//! files inherited from upstream jobs), so conversion is a four-stage
//! pipeline:
//!
//! 1. [`jobtree`]: follow `job.json` parent references to resolve the
//!    ordered chain of record files describing the job's particles.
//! 2. [`merge`]: combine the chain into one table, keyed by per-record
//!    uid, with later (more specific) files overriding earlier ones.
//! 3. [`mapping`]: rename and re-encode fields into the destination
//!    vocabulary - absolute pixel coordinates, Euler angles in degrees,
//!    1-based indices, optional class filtering.
//! 4. [`micrograph`]: derive the deduplicated per-micrograph table and
//!    the micrograph reference rewrite map.
//!
//! The whole pipeline is a pure in-memory transform; only the binary
//! writes the resulting tables to disk. See [`convert::convert_job`]
//! for the one-call entry point:
//!
//! ```rust,no_run
//! use cs2star::convert::{convert_job, ConvertOptions};
//!
//! let conversion = convert_job("P12/J42".as_ref(), &ConvertOptions::default())?;
//! println!(
//!     "{} particles over {} micrographs",
//!     conversion.stats.particles,
//!     conversion.stats.micrographs
//! );
//! # Ok::<(), cs2star::convert::ConvertError>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod convert;
pub mod csfile;
pub mod jobtree;
pub mod mapping;
pub mod merge;
pub mod micrograph;
pub mod star;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::convert::{convert_job, Conversion, ConvertError, ConvertOptions, ConvertStats};
    pub use crate::csfile::{CsFileError, FieldSchema, RecordTable, Value};
    pub use crate::jobtree::{resolve_job, JobTreeError, ResolvedJob, SourceChain};
    pub use crate::mapping::{map_particles, select_classes, MapError};
    pub use crate::merge::{merge_chain, MergeError, MergeStats, MergedTable};
    pub use crate::micrograph::{derive_micrographs, DeriveError, RewriteMap};
    pub use crate::star::{columns, StarTable, StarValue};
}
