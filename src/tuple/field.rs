//! Field types and values with their fixed-width codec.

use std::fmt;

use crate::common::config::STRING_LEN;

/// Type of a column.
///
/// Every type has a fixed on-disk width, which is what lets a heap page
/// compute its slot count from the schema alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 32-bit signed integer, big-endian.
    Int,
    /// Length-prefixed string padded to [`STRING_LEN`] bytes.
    String,
}

impl Type {
    /// Width of a serialized value of this type.
    pub const fn size(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::String => 4 + STRING_LEN,
        }
    }

    /// Decode one value of this type from the front of `data`.
    ///
    /// Invalid UTF-8 is replaced lossily and the result is cut back to
    /// [`STRING_LEN`] bytes, so the value always serializes to bytes that
    /// parse to itself.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`Type::size`].
    pub fn parse(&self, data: &[u8]) -> Field {
        match self {
            Type::Int => Field::Int(i32::from_be_bytes([data[0], data[1], data[2], data[3]])),
            Type::String => {
                let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
                let len = len.min(STRING_LEN);
                let mut field = Field::String(String::from_utf8_lossy(&data[4..4 + len]).into_owned());
                field.fit_to_width();
                field
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::String => write!(f, "string"),
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    String(String),
}

impl Field {
    /// The type this value serializes as.
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::String(_) => Type::String,
        }
    }

    /// Cut a string value down to what its fixed-width slot stores.
    ///
    /// Strings longer than [`STRING_LEN`] bytes lose their tail at the last
    /// char boundary that fits. Ints are left alone.
    pub fn fit_to_width(&mut self) {
        if let Field::String(s) = self {
            let end = fitting_len(s);
            s.truncate(end);
        }
    }

    /// Append the fixed-width encoding of this value to `out`.
    ///
    /// Strings are written as [`fit_to_width`](Self::fit_to_width) would
    /// leave them.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Field::String(s) => {
                let bytes = &s.as_bytes()[..fitting_len(s)];
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
                out.resize(out.len() + STRING_LEN - bytes.len(), 0);
            }
        }
    }
}

/// Longest prefix of `s` within `STRING_LEN` bytes that ends on a char boundary.
fn fitting_len(s: &str) -> usize {
    let mut end = s.len().min(STRING_LEN);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::String(s.to_string())
    }
}
