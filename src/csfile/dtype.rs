//! Field types and the per-file schema.

use std::collections::HashMap;

use super::header::DescrEntry;

/// Scalar storage type of one field element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Unsigned integer of the given byte width (1, 2, 4 or 8)
    Unsigned(usize),
    /// Signed integer of the given byte width (1, 2, 4 or 8)
    Signed(usize),
    /// IEEE float of the given byte width (4 or 8)
    Float(usize),
    /// Fixed-length byte string, NUL-padded
    Bytes(usize),
}

impl ElementType {
    /// Storage width of one element in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            ElementType::Unsigned(n) | ElementType::Signed(n) | ElementType::Float(n) => *n,
            ElementType::Bytes(n) => *n,
        }
    }
}

/// Full type of one field: an element type plus a repeat count
///
/// `count > 1` means the field is a fixed-size numeric tuple (e.g. a
/// micrograph shape 2-vector or a pose 3-vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    /// Scalar element type
    pub element: ElementType,
    /// Number of elements per record (1 for plain scalars)
    pub count: usize,
}

impl FieldType {
    /// Storage width of the whole field in bytes
    pub fn byte_len(&self) -> usize {
        self.element.byte_len() * self.count
    }
}

/// One named field of a record file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// Field name, e.g. `location/center_x_frac`
    pub name: String,
    /// Field type
    pub ty: FieldType,
}

/// Ordered field layout of one record file
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<FieldDesc>,
    index: HashMap<String, usize>,
}

impl FieldSchema {
    /// Build a schema from an ordered field list
    pub fn new(fields: Vec<FieldDesc>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self { fields, index }
    }

    /// Fields in declaration (storage) order
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Position of a field, if declared
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether the schema declares the given field
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Storage width of one whole record in bytes
    pub fn record_len(&self) -> usize {
        self.fields.iter().map(|f| f.ty.byte_len()).sum()
    }
}

/// Translate a parsed header entry into a typed field.
///
/// Returns the offending dtype string on failure so the caller can name
/// it in the error.
pub(super) fn field_from_descr(entry: &DescrEntry) -> Result<FieldDesc, String> {
    let ty = parse_dtype(&entry.dtype)?;
    let count = match &entry.shape {
        None => 1,
        Some(dims) => {
            if dims.len() != 1 {
                return Err(entry.dtype.clone());
            }
            dims[0]
        }
    };
    if count == 0 {
        return Err(entry.dtype.clone());
    }
    if count > 1 && matches!(ty, ElementType::Bytes(_)) {
        // string tuples never occur in cs files
        return Err(entry.dtype.clone());
    }
    Ok(FieldDesc {
        name: entry.name.clone(),
        ty: FieldType { element: ty, count },
    })
}

fn parse_dtype(dtype: &str) -> Result<ElementType, String> {
    let mut chars = dtype.chars();
    let order = chars.next().ok_or_else(|| dtype.to_string())?;
    match order {
        '<' | '|' | '=' => {}
        // big-endian data never comes out of the upstream pipeline
        _ => return Err(dtype.to_string()),
    }
    let kind = chars.next().ok_or_else(|| dtype.to_string())?;
    let size: usize = chars
        .as_str()
        .parse()
        .map_err(|_| dtype.to_string())?;
    match (kind, size) {
        ('u', 1 | 2 | 4 | 8) => Ok(ElementType::Unsigned(size)),
        ('i', 1 | 2 | 4 | 8) => Ok(ElementType::Signed(size)),
        ('f', 4 | 8) => Ok(ElementType::Float(size)),
        // numpy bool, stored as a single 0/1 byte
        ('b', 1) => Ok(ElementType::Unsigned(1)),
        ('S', n) if n > 0 => Ok(ElementType::Bytes(n)),
        _ => Err(dtype.to_string()),
    }
}
