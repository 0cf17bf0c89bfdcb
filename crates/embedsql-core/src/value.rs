use smol_str::SmolStr;

/// A runtime value produced by expression evaluation or stored in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(SmolStr),
    /// A generator source for `Generate`: an eagerly materialized sequence of
    /// scalar values. Concrete storage engines may produce this from a JSON
    /// array column or similar; the core only needs to explode it.
    Array(Vec<Value>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Text(_) => DataType::Text,
            Value::Array(values) => {
                DataType::Array(Box::new(values.first().map_or(DataType::Null, Value::data_type)))
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// The logical type of a column or resolved expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Array(Box<DataType>),
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "text"),
            DataType::Array(inner) => write!(f, "array<{inner}>"),
        }
    }
}

/// An ordered tuple of values produced by a row iterator.
pub type Row = Vec<Value>;
