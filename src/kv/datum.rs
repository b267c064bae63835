//! Dynamic document values.
//!
//! A [`Datum`] is the unit of data the stream operators yield and the KV
//! protocol stores: null, boolean, number, string, array, or object.
//! Datums carry a deterministic total order (type rank first, then value,
//! with numbers compared by their total order) so they can serve as group
//! keys and produce stable serialized forms.

use crate::core::error::{TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A dynamic document value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Arr(Vec<Datum>),
    Obj(BTreeMap<String, Datum>),
}

impl Datum {
    /// Build an object from field/value pairs.
    pub fn obj<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Datum)>,
        K: Into<String>,
    {
        Self::Obj(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// The name of this datum's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Num(_) => "NUMBER",
            Self::Str(_) => "STRING",
            Self::Arr(_) => "ARRAY",
            Self::Obj(_) => "OBJECT",
        }
    }

    /// Look up a field of an object datum.
    pub fn get(&self, field: &str) -> Option<&Datum> {
        match self {
            Self::Obj(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Truthiness for filter predicates: everything but `null` and
    /// `false` passes.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    /// The numeric value, or a query error.
    pub fn as_num(&self) -> TesseraResult<f64> {
        match self {
            Self::Num(n) => Ok(*n),
            other => Err(TesseraError::user_query(format!(
                "Expected NUMBER but got {}.",
                other.type_name()
            ))),
        }
    }

    /// The array elements, or a query error.
    pub fn as_arr(&self) -> TesseraResult<&[Datum]> {
        match self {
            Self::Arr(items) => Ok(items),
            other => Err(TesseraError::user_query(format!(
                "Expected ARRAY but got {}.",
                other.type_name()
            ))),
        }
    }

    /// Overlay `other`'s fields on top of this object's fields.
    ///
    /// Both operands must be objects; fields of `other` win on conflict.
    pub fn merge(&self, other: &Datum) -> TesseraResult<Datum> {
        match (self, other) {
            (Self::Obj(left), Self::Obj(right)) => {
                let mut merged = left.clone();
                for (k, v) in right {
                    merged.insert(k.clone(), v.clone());
                }
                Ok(Self::Obj(merged))
            }
            (left, right) => Err(TesseraError::user_query(format!(
                "Cannot merge {} with {}.",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Num(_) => 2,
            Self::Str(_) => 3,
            Self::Arr(_) => 4,
            Self::Obj(_) => 5,
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Num(a), Self::Num(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Arr(a), Self::Arr(b)) => a.cmp(b),
            (Self::Obj(a), Self::Obj(b)) => a.iter().cmp(b.iter()),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.type_rank());
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Num(n) => n.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Arr(items) => items.hash(state),
            Self::Obj(fields) => {
                for (k, v) in fields {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Self::Num(n as f64)
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(items: Vec<Datum>) -> Self {
        Self::Arr(items)
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Num(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Arr(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Obj(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
