//! Scalar values, field values and the flat column map produced by `extract()`.

use std::fmt;

/// One loggable cell. `Null` is written as an empty field.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident: $($ty:ty),+) => {
        $(impl From<$ty> for Scalar {
            fn from(v: $ty) -> Self {
                Scalar::$variant(v.into())
            }
        })+
    };
}

scalar_from!(Int: i64, i32, i16, i8, u32, u16, u8);
scalar_from!(Float: f64, f32);
scalar_from!(Bool: bool);
scalar_from!(Text: String, &str);

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Scalar {
    fn from(v: usize) -> Self {
        Scalar::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// What a field getter yields: a scalar, a fixed-length vector, or a nested
/// record of named scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Vector(Vec<f64>),
    Record(Vec<(&'static str, Scalar)>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Named entry of a record value.
    pub fn entry(&self, key: &str) -> Option<&Scalar> {
        match self {
            Value::Record(entries) => entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

macro_rules! value_from_scalar {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Scalar(v.into())
            }
        })+
    };
}

value_from_scalar!(
    i64, i32, i16, i8, u64, u32, u16, u8, usize, f64, f32, bool, String, &str,
    Option<f64>, Option<i64>, Option<bool>, Option<String>
);

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Vector(v.to_vec())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

/// Flat, insertion-ordered column → scalar map.
///
/// Inserting an existing column replaces its value in place, so merging the
/// output of several fields keeps the first-seen column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    entries: Vec<(String, Scalar)>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn merge(&mut self, other: Columns) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Columns {
    type Item = (String, Scalar);
    type IntoIter = std::vec::IntoIter<(String, Scalar)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Columns {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut columns = Columns::new();
        for (k, v) in iter {
            columns.insert(k, v);
        }
        columns
    }
}

/// Projects a field value into columns. The first argument is the default
/// column name, `"{publisher}-{field}"`.
pub type Formatter = fn(&str, &Value) -> Columns;

/// Default projection: a scalar keeps the column name, vector components get
/// `_{index}`, record entries get `_{key}`.
pub fn default_columns(column: &str, value: &Value) -> Columns {
    match value {
        Value::Scalar(s) => {
            let mut out = Columns::with_capacity(1);
            out.insert(column, s.clone());
            out
        }
        Value::Vector(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("{column}_{i}"), *v))
            .collect(),
        Value::Record(entries) => entries
            .iter()
            .map(|(k, v)| (format!("{column}_{k}"), v.clone()))
            .collect(),
    }
}

/// Stock formatters for common sensor shapes.
pub mod formatters {
    use super::{Columns, Value, default_columns};

    /// Three-axis vector → `_x`, `_y`, `_z`.
    pub fn xyz(column: &str, value: &Value) -> Columns {
        match value.as_vector() {
            Some([x, y, z]) => [
                (format!("{column}_x"), *x),
                (format!("{column}_y"), *y),
                (format!("{column}_z"), *z),
            ]
            .into_iter()
            .collect(),
            _ => default_columns(column, value),
        }
    }

    /// Rounds scalar floats to two decimals; anything else uses the default.
    pub fn centi(column: &str, value: &Value) -> Columns {
        match value.as_f64() {
            Some(v) => [(column.to_string(), (v * 100.0).round() / 100.0)]
                .into_iter()
                .collect(),
            None => default_columns(column, value),
        }
    }
}
