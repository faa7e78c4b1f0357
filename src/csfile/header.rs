//! Header dict parsing.
//!
//! The header is a single dict literal of the form
//!
//! ```text
//! {'descr': [('uid', '<u8'), ('blob/shape', '<u4', (2,))],
//!  'fortran_order': False, 'shape': (1234,), }
//! ```
//!
//! Only the three keys above are legal. A tiny hand-rolled cursor parser
//! is enough; the grammar is fixed and the values are flat.

/// One entry of the `descr` list, still untyped
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct DescrEntry {
    pub name: String,
    pub dtype: String,
    pub shape: Option<Vec<usize>>,
}

/// Parsed header contents
#[derive(Debug)]
pub(super) struct Header {
    pub descr: Vec<DescrEntry>,
    pub rows: usize,
}

/// Parse the header dict. Errors are plain reasons; the caller attaches
/// the file path.
pub(super) fn parse_header(text: &str) -> Result<Header, String> {
    let mut p = Parser {
        bytes: text.as_bytes(),
        pos: 0,
    };
    let mut descr = None;
    let mut fortran_order = None;
    let mut shape = None;

    p.skip_ws();
    p.expect(b'{')?;
    loop {
        p.skip_ws();
        if p.eat(b'}') {
            break;
        }
        let key = p.parse_quoted()?;
        p.skip_ws();
        p.expect(b':')?;
        p.skip_ws();
        match key.as_str() {
            "descr" => descr = Some(p.parse_descr_list()?),
            "fortran_order" => fortran_order = Some(p.parse_bool()?),
            "shape" => shape = Some(p.parse_int_tuple()?),
            other => return Err(format!("unexpected header key {:?}", other)),
        }
        p.skip_ws();
        // entries may or may not have a trailing comma
        p.eat(b',');
    }

    let descr = descr.ok_or("missing 'descr' key")?;
    let fortran_order = fortran_order.ok_or("missing 'fortran_order' key")?;
    let shape = shape.ok_or("missing 'shape' key")?;
    if fortran_order {
        return Err("fortran-ordered data is not supported".to_string());
    }
    if shape.len() != 1 {
        return Err(format!("expected a 1-d record table, got shape {:?}", shape));
    }
    Ok(Header {
        descr,
        rows: shape[0],
    })
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), String> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(format!(
                "expected {:?} at byte {}",
                b as char, self.pos
            ))
        }
    }

    fn parse_quoted(&mut self) -> Result<String, String> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(format!("expected quoted string at byte {}", self.pos)),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err("unterminated string".to_string())
    }

    fn parse_bool(&mut self) -> Result<bool, String> {
        if self.bytes[self.pos..].starts_with(b"True") {
            self.pos += 4;
            Ok(true)
        } else if self.bytes[self.pos..].starts_with(b"False") {
            self.pos += 5;
            Ok(false)
        } else {
            Err(format!("expected True/False at byte {}", self.pos))
        }
    }

    fn parse_usize(&mut self) -> Result<usize, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected integer at byte {}", self.pos));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format!("invalid integer at byte {}", start))
    }

    fn parse_int_tuple(&mut self) -> Result<Vec<usize>, String> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(b')') {
                break;
            }
            items.push(self.parse_usize()?);
            self.skip_ws();
            self.eat(b',');
        }
        Ok(items)
    }

    fn parse_descr_list(&mut self) -> Result<Vec<DescrEntry>, String> {
        self.expect(b'[')?;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(b']') {
                break;
            }
            entries.push(self.parse_descr_entry()?);
            self.skip_ws();
            self.eat(b',');
        }
        Ok(entries)
    }

    fn parse_descr_entry(&mut self) -> Result<DescrEntry, String> {
        self.expect(b'(')?;
        self.skip_ws();
        let name = self.parse_quoted()?;
        self.skip_ws();
        self.expect(b',')?;
        self.skip_ws();
        let dtype = self.parse_quoted()?;
        self.skip_ws();
        let shape = if self.eat(b',') {
            self.skip_ws();
            if self.peek() == Some(b'(') {
                Some(self.parse_int_tuple()?)
            } else {
                None
            }
        } else {
            None
        };
        self.skip_ws();
        self.expect(b')')?;
        Ok(DescrEntry { name, dtype, shape })
    }
}

#[cfg(test)]
mod header_tests {
    use super::*;

    #[test]
    fn test_parse_typical_header() {
        let text = "{'descr': [('uid', '<u8'), ('blob/path', '|S48'), \
                    ('blob/shape', '<u4', (2,)), ], \
                    'fortran_order': False, 'shape': (1234,), }";
        let header = parse_header(text).unwrap();
        assert_eq!(header.rows, 1234);
        assert_eq!(header.descr.len(), 3);
        assert_eq!(header.descr[0].name, "uid");
        assert_eq!(header.descr[0].dtype, "<u8");
        assert_eq!(header.descr[2].shape, Some(vec![2]));
    }

    #[test]
    fn test_reject_fortran_order() {
        let text = "{'descr': [('uid', '<u8')], 'fortran_order': True, 'shape': (1,)}";
        assert!(parse_header(text).is_err());
    }

    #[test]
    fn test_reject_multidim_shape() {
        let text = "{'descr': [('uid', '<u8')], 'fortran_order': False, 'shape': (4, 4)}";
        assert!(parse_header(text).is_err());
    }

    #[test]
    fn test_reject_missing_keys() {
        assert!(parse_header("{'fortran_order': False, 'shape': (1,)}").is_err());
        assert!(parse_header("{'descr': [], 'shape': (1,)}").is_err());
    }
}
