use super::heap::ComponentRef;
use std::fmt;

/// A value of the interpreted program. Components are referenced through
/// the run's heap.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Invalid,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Object(ComponentRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Object(_) => "Object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ComponentRef> {
        match self {
            Self::Object(component) => Some(*component),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<ComponentRef> for Value {
    fn from(component: ComponentRef) -> Self {
        Self::Object(component)
    }
}

/// Formatting used by `print` and `Str()` for scalar values.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Self::Float(value) => write!(f, "{value}"),
            Self::String(text) => write!(f, "{text}"),
            Self::Object(_) => write!(f, "<Component>"),
        }
    }
}
