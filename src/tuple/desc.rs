//! Tuple descriptors (table schemas).

use std::fmt;

use super::field::Type;

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdItem {
    pub field_type: Type,
    pub name: Option<String>,
}

/// Ordered list of column types and optional names.
///
/// Equality looks at the types only: two tables with the same column types
/// but different column names store tuples in exactly the same layout.
///
/// # Example
/// ```
/// use heapdb::tuple::{TupleDesc, Type};
///
/// let desc = TupleDesc::with_names(vec![Type::Int, Type::String], vec!["id", "name"]);
/// assert_eq!(desc.size(), 4 + 132);
/// assert_eq!(desc.field_index("name"), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    /// Schema with anonymous columns.
    pub fn new(types: Vec<Type>) -> Self {
        Self {
            items: types
                .into_iter()
                .map(|field_type| TdItem {
                    field_type,
                    name: None,
                })
                .collect(),
        }
    }

    /// Schema with named columns. Extra names or types are ignored.
    pub fn with_names<S: Into<String>>(types: Vec<Type>, names: Vec<S>) -> Self {
        Self {
            items: types
                .into_iter()
                .zip(names)
                .map(|(field_type, name)| TdItem {
                    field_type,
                    name: Some(name.into()),
                })
                .collect(),
        }
    }

    /// Number of columns.
    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Option<Type> {
        self.items.get(i).map(|item| item.field_type)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items.get(i).and_then(|item| item.name.as_deref())
    }

    /// Index of the first column with the given name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
    }

    /// Serialized width of one tuple in bytes.
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.size()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &TdItem> {
        self.items.iter()
    }

    /// Concatenate two schemas, `a`'s columns first.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        TupleDesc {
            items: a.items.iter().chain(b.items.iter()).cloned().collect(),
        }
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", item.field_type, item.name.as_deref().unwrap_or("null"))?;
        }
        Ok(())
    }
}
