//! # STAR table model and serialization
//!
//! The destination side of the conversion: an ordered, named table of
//! typed values, serialized as one STAR `data_`/`loop_` block. Column
//! order is significant and preserved exactly as built by the mapper.
//!
//! Floats are printed with six decimal places, matching what downstream
//! refinement tools emit themselves.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

/// STAR column name constants.
pub mod columns;


/// Errors raised while building a table
#[derive(Debug, thiserror::Error)]
pub enum StarError {
    /// A row's length does not match the declared columns
    #[error("row has {got} values but table {table:?} has {expected} columns")]
    RowArity {
        /// Table (block) name
        table: String,
        /// Declared column count
        expected: usize,
        /// Length of the offending row
        got: usize,
    },
}

/// A single cell of a STAR table
#[derive(Debug, Clone, PartialEq)]
pub enum StarValue {
    /// Integer value (indices, class numbers, groups)
    Int(i64),
    /// Floating point value, serialized with six decimals
    Float(f64),
    /// String value (paths, image references)
    Str(String),
}

impl fmt::Display for StarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StarValue::Int(v) => write!(f, "{}", v),
            StarValue::Float(v) => write!(f, "{:.6}", v),
            StarValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl StarValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StarValue::Int(v) => Some(*v as f64),
            StarValue::Float(v) => Some(*v),
            StarValue::Str(_) => None,
        }
    }

    /// Integer view of the value, if it is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StarValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// One STAR data block: named, ordered columns over uniform rows
#[derive(Debug, Clone)]
pub struct StarTable {
    name: String,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<StarValue>>,
}

impl StarTable {
    /// Create an empty table with the given block name and column order
    pub fn new(name: &str, columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            name: name.to_string(),
            columns,
            index,
            rows: Vec::new(),
        }
    }

    /// Block name (without the `data_` prefix)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names, in serialization order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column, if present
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether the table declares the given column
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Append a row; its length must match the declared columns
    pub fn push_row(&mut self, row: Vec<StarValue>) -> Result<(), StarError> {
        if row.len() != self.columns.len() {
            return Err(StarError::RowArity {
                table: self.name.clone(),
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// All rows, in insertion order
    pub fn rows(&self) -> &[Vec<StarValue>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row number and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&StarValue> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Overwrite a single cell; out-of-range coordinates are ignored
    pub fn set_value(&mut self, row: usize, column: &str, value: StarValue) {
        if let Some(col) = self.column_index(column) {
            if let Some(r) = self.rows.get_mut(row) {
                if let Some(cell) = r.get_mut(col) {
                    *cell = value;
                }
            }
        }
    }

    /// Keep only the rows for which the predicate returns true,
    /// preserving order. Returns the number of dropped rows.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[StarValue]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|r| keep(r));
        before - self.rows.len()
    }

    /// Serialize the table as a STAR `data_`/`loop_` block
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "data_{}", self.name)?;
        writeln!(w)?;
        writeln!(w, "loop_")?;
        for (i, column) in self.columns.iter().enumerate() {
            writeln!(w, "_{} #{}", column, i + 1)?;
        }
        for row in &self.rows {
            let mut first = true;
            for value in row {
                if !first {
                    write!(w, " ")?;
                }
                write!(w, "{}", value)?;
                first = false;
            }
            writeln!(w)?;
        }
        writeln!(w)?;
        Ok(())
    }

    /// Serialize to an in-memory string
    pub fn to_star_string(&self) -> String {
        let mut buf = Vec::new();
        // writing to a Vec cannot fail
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
