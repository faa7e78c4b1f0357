//! # Micrograph table derivation
//!
//! The destination pipeline wants a second table with one row per
//! unique micrograph. It is derived from the mapped particle table:
//! particles are grouped by their raw micrograph reference, every
//! image-scoped field (pixel size, voltage, optics group, ...) is
//! checked for agreement within the group, and each micrograph gets a
//! rewritten reference with the destination data-file extension.
//!
//! Disagreement within a group is fatal: it means the source tree mixed
//! particles from images with different acquisition parameters, and
//! averaging or picking one would produce a silently wrong table.
//!
//! The rewrite map is deterministic and order-preserving: the first raw
//! reference encountered gets the first rewritten name, in encounter
//! order, never sorted.

use std::collections::HashMap;

use log::info;

use crate::star::{columns, StarTable, StarValue};


/// Fields that must be constant across all particles of one micrograph
const IMAGE_SCOPED: [&str; 5] = [
    columns::IMAGE_PIXEL_SIZE,
    columns::VOLTAGE,
    columns::SPHERICAL_ABERRATION,
    columns::AMPLITUDE_CONTRAST,
    columns::OPTICS_GROUP,
];

/// Errors that can occur while deriving the micrograph table
#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    /// An image-scoped field differs between particles of one micrograph
    #[error(
        "inconsistent image metadata for {micrograph}: field {field} is {first} for one \
         particle and {second} for another"
    )]
    InconsistentImageMetadata {
        /// The offending micrograph reference
        micrograph: String,
        /// The divergent field
        field: String,
        /// Value seen first
        first: String,
        /// Conflicting value
        second: String,
    },

    /// The particle table has no micrograph reference column
    #[error("particle table has no {} column", columns::MICROGRAPH_NAME)]
    MissingReferenceColumn,

    /// Micrograph table construction failed
    #[error(transparent)]
    Table(#[from] crate::star::StarError),
}

/// Mapping from raw micrograph references to rewritten ones,
/// in first-encounter order
#[derive(Debug, Clone, Default)]
pub struct RewriteMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl RewriteMap {
    /// Rewritten reference for a raw one
    pub fn get(&self, raw: &str) -> Option<&str> {
        self.index
            .get(raw)
            .map(|&i| self.entries[i].1.as_str())
    }

    /// (raw, rewritten) pairs in first-encounter order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Number of distinct micrographs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, raw: String, rewritten: String) {
        if !self.index.contains_key(&raw) {
            self.index.insert(raw.clone(), self.entries.len());
            self.entries.push((raw, rewritten));
        }
    }
}

/// Replace a reference's data-file extension; no extension appends one
pub fn rewrite_reference(raw: &str, extension: &str) -> String {
    let basename_start = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
    match raw[basename_start..].rfind('.') {
        Some(dot) => format!("{}.{}", &raw[..basename_start + dot], extension),
        None => format!("{}.{}", raw, extension),
    }
}

/// Derive the micrograph table from the particle table and rewrite the
/// particle micrograph references in place.
///
/// `tolerance` is the relative epsilon for float comparisons;
/// integer and string fields must match exactly.
pub fn derive_micrographs(
    particles: &mut StarTable,
    extension: &str,
    tolerance: f64,
) -> Result<(StarTable, RewriteMap), DeriveError> {
    let ref_col = particles
        .column_index(columns::MICROGRAPH_NAME)
        .ok_or(DeriveError::MissingReferenceColumn)?;

    let scoped: Vec<&str> = IMAGE_SCOPED
        .iter()
        .copied()
        .filter(|c| particles.has_column(c))
        .collect();
    let scoped_cols: Vec<usize> = scoped
        .iter()
        .filter_map(|c| particles.column_index(c))
        .collect();

    // first pass: group rows and verify intra-group agreement before
    // anything is rewritten
    let mut order: Vec<String> = Vec::new();
    let mut firsts: HashMap<String, Vec<StarValue>> = HashMap::new();
    for row in particles.rows() {
        let Some(raw) = row[ref_col].as_str() else {
            continue;
        };
        let values: Vec<StarValue> = scoped_cols.iter().map(|&c| row[c].clone()).collect();
        match firsts.get(raw) {
            None => {
                order.push(raw.to_string());
                firsts.insert(raw.to_string(), values);
            }
            Some(seen) => {
                for ((field, first), second) in scoped.iter().zip(seen).zip(&values) {
                    if !values_agree(first, second, tolerance) {
                        return Err(DeriveError::InconsistentImageMetadata {
                            micrograph: raw.to_string(),
                            field: field.to_string(),
                            first: first.to_string(),
                            second: second.to_string(),
                        });
                    }
                }
            }
        }
    }

    // second pass: assign rewritten names in encounter order
    let mut map = RewriteMap::default();
    for raw in &order {
        map.insert(raw.clone(), rewrite_reference(raw, extension));
    }

    // third pass: build the micrograph table and patch the particles
    let mut table_columns = vec![columns::MICROGRAPH_NAME.to_string()];
    table_columns.extend(scoped.iter().map(|c| c.to_string()));
    let mut micrographs = StarTable::new("micrographs", table_columns);
    for raw in &order {
        let rewritten = map.get(raw).unwrap_or(raw).to_string();
        let mut row = vec![StarValue::Str(rewritten)];
        if let Some(values) = firsts.get(raw) {
            row.extend(values.iter().cloned());
        }
        micrographs.push_row(row)?;
    }

    for row in 0..particles.len() {
        let raw = particles
            .value(row, columns::MICROGRAPH_NAME)
            .and_then(StarValue::as_str)
            .map(str::to_string);
        if let Some(raw) = raw {
            if let Some(rewritten) = map.get(&raw) {
                particles.set_value(
                    row,
                    columns::MICROGRAPH_NAME,
                    StarValue::Str(rewritten.to_string()),
                );
            }
        }
    }

    info!(
        "derived {} micrograph(s) from {} particle(s)",
        micrographs.len(),
        particles.len()
    );
    Ok((micrographs, map))
}

/// Exact match for integers and strings, relative epsilon for floats
fn values_agree(a: &StarValue, b: &StarValue, tolerance: f64) -> bool {
    match (a, b) {
        (StarValue::Float(x), StarValue::Float(y)) => {
            x == y || (x - y).abs() <= tolerance * x.abs().max(y.abs())
        }
        _ => a == b,
    }
}
