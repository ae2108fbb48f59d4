//! Driver-neutral row model with typed, positional and named access.

use std::fmt;

use crate::error::GatherError;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Column type the driver does not decode; carries the type name.
    Unsupported(String),
}

impl Value {
    fn type_name(&self) -> &str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Unsupported(name) => write!(f, "<{}>", name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

/// One result row: column names plus decoded values, same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, C, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index_of(&self, column: &str) -> Result<usize, GatherError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| GatherError::scan(column, "column not found in result"))
    }

    pub fn value(&self, idx: usize) -> Result<&Value, GatherError> {
        self.values.get(idx).ok_or_else(|| {
            GatherError::scan(
                idx.to_string(),
                format!("row has {} columns", self.values.len()),
            )
        })
    }

    pub fn text(&self, idx: usize) -> Result<&str, GatherError> {
        match self.value(idx)? {
            Value::Text(s) => Ok(s),
            other => Err(self.mismatch(idx, "text", other)),
        }
    }

    pub fn int(&self, idx: usize) -> Result<i64, GatherError> {
        match self.value(idx)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.mismatch(idx, "integer", other)),
        }
    }

    /// Floats, or integers widened to float.
    pub fn float(&self, idx: usize) -> Result<f64, GatherError> {
        match self.value(idx)? {
            Value::Float(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            other => Err(self.mismatch(idx, "float", other)),
        }
    }

    fn column_label(&self, idx: usize) -> String {
        match self.columns.get(idx) {
            Some(name) => format!("{} ({})", idx, name),
            None => idx.to_string(),
        }
    }

    fn mismatch(&self, idx: usize, expected: &str, found: &Value) -> GatherError {
        GatherError::scan(
            self.column_label(idx),
            format!("expected {}, found {}", expected, found.type_name()),
        )
    }
}
