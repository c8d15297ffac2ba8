//! Property values shared by the document tree, the resolved tree and the codec.

use crate::resolve::ResolvedClass;

/// A scalar or array property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
    /// Ordered elements; may nest further arrays.
    Array(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Int or float widened to f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(x) => Some(f64::from(*x)),
            Value::Float(x) => Some(f64::from(*x)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::Int(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// One entry of a resolved property map: a value or a materialized sub-class.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Value(Value),
    Class(ResolvedClass),
}

impl Property {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Property::Value(v) => Some(v),
            Property::Class(_) => None,
        }
    }

    pub fn as_class(&self) -> Option<&ResolvedClass> {
        match self {
            Property::Class(c) => Some(c),
            Property::Value(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        self.as_value().and_then(Value::as_int)
    }

    pub fn as_float(&self) -> Option<f32> {
        self.as_value().and_then(Value::as_float)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        self.as_value().and_then(Value::as_array)
    }
}

impl From<Value> for Property {
    fn from(v: Value) -> Self {
        Property::Value(v)
    }
}

impl From<ResolvedClass> for Property {
    fn from(c: ResolvedClass) -> Self {
        Property::Class(c)
    }
}
