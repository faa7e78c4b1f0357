//! # Chain merging
//!
//! Combines the resolved file chain into one table. The first (most
//! upstream) file is the *base*: it fixes the row count and the uid
//! domain. Every subsequent file patches matching rows field by field,
//! a plain replace with no arithmetic combination; its rows without a
//! matching base uid are skipped and counted, never appended. A file
//! with no `uid` column at all cannot be matched and aborts the merge,
//! since dropping it would silently lose every field it carries.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{info, warn};

use crate::csfile::{CsFileError, RecordTable, Value};
use crate::jobtree::SourceChain;


/// Name of the per-record identifier field
pub const UID_FIELD: &str = "uid";

/// Errors that can occur while merging a file chain
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A chain file could not be read or decoded
    #[error(transparent)]
    CsFile(#[from] CsFileError),

    /// A chain file has no identifier column and cannot be matched
    #[error("{path} has no {UID_FIELD} field and cannot be merged")]
    UnmergeableFile {
        /// The offending file
        path: PathBuf,
    },

    /// The chain contained no files
    #[error("cannot merge an empty file chain")]
    EmptyChain,
}

/// Counters accumulated over one merge
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    /// Files combined into the result
    pub files_merged: usize,
    /// Rows in the merged table
    pub records: usize,
    /// Rows of subsequent files without a matching base uid
    pub skipped: u64,
}

/// Union of the chain's tables, keyed by uid
#[derive(Debug, Clone)]
pub struct MergedTable {
    fields: Vec<String>,
    index: HashMap<String, usize>,
    uids: Vec<u64>,
    uid_index: HashMap<u64, usize>,
    rows: Vec<Vec<Option<Value>>>,
}

impl MergedTable {
    /// Seed the merge from the base table. Fails if the base has no
    /// uid column.
    pub fn from_base(base: &RecordTable) -> Result<Self, MergeError> {
        let uid_col =
            base.schema()
                .field_index(UID_FIELD)
                .ok_or_else(|| MergeError::UnmergeableFile {
                    path: base.path().to_path_buf(),
                })?;

        let fields: Vec<String> = base
            .schema()
            .fields()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i))
            .collect();

        let mut uids = Vec::with_capacity(base.len());
        let mut uid_index = HashMap::with_capacity(base.len());
        let mut rows = Vec::with_capacity(base.len());
        for row in base.rows() {
            let uid = row.get(uid_col).and_then(Value::as_u64).unwrap_or_default();
            if uid_index.insert(uid, rows.len()).is_some() {
                warn!(
                    "{}: duplicate uid {} in base table, later row wins",
                    base.path().display(),
                    uid
                );
            }
            uids.push(uid);
            rows.push(row.iter().cloned().map(Some).collect());
        }

        Ok(Self {
            fields,
            index,
            uids,
            uid_index,
            rows,
        })
    }

    /// Patch matching rows with the fields of a subsequent file.
    /// Returns how many of its rows had no matching base uid.
    pub fn apply(&mut self, table: &RecordTable) -> Result<u64, MergeError> {
        let uid_col =
            table
                .schema()
                .field_index(UID_FIELD)
                .ok_or_else(|| MergeError::UnmergeableFile {
                    path: table.path().to_path_buf(),
                })?;

        let columns: Vec<usize> = table
            .schema()
            .fields()
            .iter()
            .map(|f| self.ensure_field(&f.name))
            .collect();

        let mut skipped = 0u64;
        for row in table.rows() {
            let uid = row.get(uid_col).and_then(Value::as_u64).unwrap_or_default();
            let Some(&target) = self.uid_index.get(&uid) else {
                skipped += 1;
                continue;
            };
            for (value, &dest) in row.iter().zip(&columns) {
                self.rows[target][dest] = Some(value.clone());
            }
        }
        Ok(skipped)
    }

    /// Column position for a field, adding an empty column if new
    fn ensure_field(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.fields.len();
        self.fields.push(name.to_string());
        self.index.insert(name.to_string(), i);
        for row in &mut self.rows {
            row.push(None);
        }
        i
    }

    /// Append another merged table, unifying the field sets. Used to
    /// combine disjoint particle sets (splits) after their chains have
    /// been merged independently.
    pub fn append(&mut self, other: MergedTable) {
        let columns: Vec<usize> = other
            .fields
            .iter()
            .map(|f| self.ensure_field(f))
            .collect();
        for (uid, row) in other.uids.into_iter().zip(other.rows) {
            let mut merged_row = vec![None; self.fields.len()];
            for (value, &dest) in row.into_iter().zip(&columns) {
                merged_row[dest] = value;
            }
            self.uid_index.insert(uid, self.rows.len());
            self.uids.push(uid);
            self.rows.push(merged_row);
        }
    }

    /// Field names in column order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the table carries the given field
    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Row uids in row order
    pub fn uids(&self) -> &[u64] {
        &self.uids
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row number and field name
    pub fn value(&self, row: usize, field: &str) -> Option<&Value> {
        let col = *self.index.get(field)?;
        self.rows.get(row)?.get(col)?.as_ref()
    }
}

/// Load and merge every file of a chain, base first
pub fn merge_chain(chain: &SourceChain) -> Result<(MergedTable, MergeStats), MergeError> {
    let (base_path, rest) = chain.files().split_first().ok_or(MergeError::EmptyChain)?;

    let base = RecordTable::read(base_path)?;
    let mut merged = MergedTable::from_base(&base)?;
    let mut stats = MergeStats {
        files_merged: 1,
        records: merged.len(),
        skipped: 0,
    };

    for path in rest {
        let table = RecordTable::read(path)?;
        let skipped = merged.apply(&table)?;
        if skipped > 0 {
            warn!(
                "{}: {} record(s) without a matching base uid were skipped",
                path.display(),
                skipped
            );
        }
        stats.files_merged += 1;
        stats.skipped += skipped;
    }

    info!(
        "merged {} file(s) into {} records with {} fields",
        stats.files_merged,
        merged.len(),
        merged.fields().len()
    );
    Ok((merged, stats))
}
