//! Record decoding.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use super::dtype::{field_from_descr, ElementType, FieldSchema};
use super::header::parse_header;
use super::CsFileError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// One decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned integer scalar
    UInt(u64),
    /// Signed integer scalar
    Int(i64),
    /// Float scalar
    Float(f64),
    /// Byte string, NUL padding stripped
    Text(String),
    /// Fixed-size tuple of unsigned integers
    UIntVec(Vec<u64>),
    /// Fixed-size tuple of signed integers
    IntVec(Vec<i64>),
    /// Fixed-size tuple of floats
    FloatVec(Vec<f64>),
}

impl Value {
    /// Unsigned view; signed values convert when non-negative
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Signed view of any integer scalar
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Numeric view of any scalar
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Tuple view, widened to floats
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::FloatVec(v) => Some(v.clone()),
            Value::UIntVec(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::IntVec(v) => Some(v.iter().map(|x| *x as f64).collect()),
            _ => None,
        }
    }
}

/// A fully decoded record file: schema plus rows
#[derive(Debug, Clone)]
pub struct RecordTable {
    schema: FieldSchema,
    rows: Vec<Vec<Value>>,
    path: PathBuf,
}

impl RecordTable {
    /// Build a table directly from parts. Every row must have exactly
    /// one value per schema field, in schema order.
    pub fn new(schema: FieldSchema, rows: Vec<Vec<Value>>) -> Self {
        Self {
            schema,
            rows,
            path: PathBuf::from("<memory>"),
        }
    }

    /// Read and decode a record file from disk
    pub fn read(path: &Path) -> Result<Self, CsFileError> {
        let data = fs::read(path).map_err(|source| CsFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if data.len() < MAGIC.len() + 4 || &data[..MAGIC.len()] != MAGIC {
            return Err(CsFileError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let major = data[6];
        let minor = data[7];
        let (header_len, header_start) = match major {
            1 => {
                let mut len_bytes = &data[8..10];
                let len = len_bytes
                    .read_u16::<LittleEndian>()
                    .map_err(|source| CsFileError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                (len as usize, 10)
            }
            2 | 3 => {
                if data.len() < 12 {
                    return Err(CsFileError::MalformedHeader {
                        path: path.to_path_buf(),
                        reason: "file too short for a version 2 header".to_string(),
                    });
                }
                let mut len_bytes = &data[8..12];
                let len = len_bytes
                    .read_u32::<LittleEndian>()
                    .map_err(|source| CsFileError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                (len as usize, 12)
            }
            _ => {
                return Err(CsFileError::UnsupportedVersion {
                    path: path.to_path_buf(),
                    major,
                    minor,
                })
            }
        };

        let data_start = header_start + header_len;
        if data.len() < data_start {
            return Err(CsFileError::MalformedHeader {
                path: path.to_path_buf(),
                reason: "declared header extends past end of file".to_string(),
            });
        }
        let header_text = String::from_utf8_lossy(&data[header_start..data_start]);
        let header = parse_header(&header_text).map_err(|reason| CsFileError::MalformedHeader {
            path: path.to_path_buf(),
            reason,
        })?;

        let mut fields = Vec::with_capacity(header.descr.len());
        for entry in &header.descr {
            let field = field_from_descr(entry).map_err(|dtype| CsFileError::UnsupportedDtype {
                path: path.to_path_buf(),
                field: entry.name.clone(),
                dtype,
            })?;
            fields.push(field);
        }
        let schema = FieldSchema::new(fields);
        if schema.fields().len() != header.descr.len() {
            return Err(CsFileError::MalformedHeader {
                path: path.to_path_buf(),
                reason: "duplicate field names".to_string(),
            });
        }

        let record_len = schema.record_len();
        let expected = header.rows * record_len;
        let payload = &data[data_start..];
        if payload.len() < expected {
            return Err(CsFileError::Truncated {
                path: path.to_path_buf(),
                expected,
                actual: payload.len(),
            });
        }

        let mut cursor = &payload[..expected];
        let mut rows = Vec::with_capacity(header.rows);
        for _ in 0..header.rows {
            let mut row = Vec::with_capacity(schema.len());
            for field in schema.fields() {
                let value =
                    decode_value(&mut cursor, field.ty.element, field.ty.count).map_err(
                        |source| CsFileError::Io {
                            path: path.to_path_buf(),
                            source,
                        },
                    )?;
                row.push(value);
            }
            rows.push(row);
        }

        debug!(
            "loaded {} records with {} fields from {}",
            rows.len(),
            schema.len(),
            path.display()
        );

        Ok(Self {
            schema,
            rows,
            path: path.to_path_buf(),
        })
    }

    /// Field layout of this file
    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Decoded rows in storage order
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no records
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Path this table was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cell lookup by row number and field name
    pub fn value(&self, row: usize, field: &str) -> Option<&Value> {
        let col = self.schema.field_index(field)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }
}

fn decode_value(
    cursor: &mut &[u8],
    element: ElementType,
    count: usize,
) -> std::io::Result<Value> {
    if count == 1 {
        return decode_scalar(cursor, element);
    }
    match element {
        ElementType::Unsigned(_) => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_unsigned(cursor, element)?);
            }
            Ok(Value::UIntVec(items))
        }
        ElementType::Signed(_) => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_signed(cursor, element)?);
            }
            Ok(Value::IntVec(items))
        }
        ElementType::Float(_) => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_float(cursor, element)?);
            }
            Ok(Value::FloatVec(items))
        }
        // rejected at schema construction
        ElementType::Bytes(_) => unreachable!("string tuples are rejected by the schema parser"),
    }
}

fn decode_scalar(cursor: &mut &[u8], element: ElementType) -> std::io::Result<Value> {
    match element {
        ElementType::Unsigned(_) => Ok(Value::UInt(read_unsigned(cursor, element)?)),
        ElementType::Signed(_) => Ok(Value::Int(read_signed(cursor, element)?)),
        ElementType::Float(_) => Ok(Value::Float(read_float(cursor, element)?)),
        ElementType::Bytes(n) => {
            let mut buf = vec![0u8; n];
            cursor.read_exact(&mut buf)?;
            let end = buf
                .iter()
                .rposition(|&b| b != 0)
                .map(|i| i + 1)
                .unwrap_or(0);
            Ok(Value::Text(
                String::from_utf8_lossy(&buf[..end]).into_owned(),
            ))
        }
    }
}

fn read_unsigned(cursor: &mut &[u8], element: ElementType) -> std::io::Result<u64> {
    Ok(match element.byte_len() {
        1 => u64::from(cursor.read_u8()?),
        2 => u64::from(cursor.read_u16::<LittleEndian>()?),
        4 => u64::from(cursor.read_u32::<LittleEndian>()?),
        _ => cursor.read_u64::<LittleEndian>()?,
    })
}

fn read_signed(cursor: &mut &[u8], element: ElementType) -> std::io::Result<i64> {
    Ok(match element.byte_len() {
        1 => i64::from(cursor.read_i8()?),
        2 => i64::from(cursor.read_i16::<LittleEndian>()?),
        4 => i64::from(cursor.read_i32::<LittleEndian>()?),
        _ => cursor.read_i64::<LittleEndian>()?,
    })
}

fn read_float(cursor: &mut &[u8], element: ElementType) -> std::io::Result<f64> {
    Ok(match element.byte_len() {
        4 => f64::from(cursor.read_f32::<LittleEndian>()?),
        _ => cursor.read_f64::<LittleEndian>()?,
    })
}
