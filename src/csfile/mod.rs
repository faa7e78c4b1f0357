//! # cryoSPARC `.cs` record files
//!
//! A `.cs` file is a binary table of fixed-width records with a
//! self-describing header: a one-line dict declaring the field layout
//! (`descr`), the storage order and the record count, followed by the
//! packed little-endian record data. This module handles the decoding
//! pipeline:
//!
//! 1. Check the magic and format version
//! 2. Parse the header dict into a [`FieldSchema`]
//! 3. Decode the fixed-width records into typed [`Value`]s
//!
//! Fields are integers, floats, fixed-length byte strings, or fixed-size
//! numeric tuples (e.g. a 2-vector micrograph shape, a 3-vector pose).
//! Big-endian files are rejected; cryoSPARC never writes them.

use std::path::PathBuf;

mod dtype;
mod header;
mod reader;


pub use dtype::{ElementType, FieldDesc, FieldSchema, FieldType};
pub use reader::{RecordTable, Value};

/// Errors that can occur while reading a `.cs` record file
#[derive(Debug, thiserror::Error)]
pub enum CsFileError {
    /// I/O failure while reading the file
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the expected magic bytes
    #[error("{path} is not a cryoSPARC record file (bad magic)")]
    BadMagic {
        /// File being read
        path: PathBuf,
    },

    /// Unsupported record file format version
    #[error("{path}: unsupported record file version {major}.{minor}")]
    UnsupportedVersion {
        /// File being read
        path: PathBuf,
        /// Declared major version
        major: u8,
        /// Declared minor version
        minor: u8,
    },

    /// The header dict could not be parsed
    #[error("{path}: malformed header: {reason}")]
    MalformedHeader {
        /// File being read
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A declared field has a dtype with no supported decoding
    #[error("{path}: field {field:?} has unsupported dtype {dtype:?}")]
    UnsupportedDtype {
        /// File being read
        path: PathBuf,
        /// Field name from the header
        field: String,
        /// Offending dtype string
        dtype: String,
    },

    /// The data section ended before all declared records were read
    #[error("{path}: truncated record data (expected {expected} bytes, got {actual})")]
    Truncated {
        /// File being read
        path: PathBuf,
        /// Bytes required by the declared shape
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },
}
