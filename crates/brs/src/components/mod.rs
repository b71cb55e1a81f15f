//! Runtime components: the objects `CreateObject` hands to interpreted code.
//!
//! Components are owned by the run's [`Heap`]; interpreted code only ever
//! holds [`ComponentRef`]s. Methods are dispatched by lowercase name.

use crate::runtime::{ComponentRef, Heap, Value};
use indexmap::IndexMap;
use thiserror::Error;

pub mod collections;
pub mod node;
pub mod pattern;
pub mod registry;
pub mod string;
pub mod timespan;
pub mod xml;

use collections::{RoArray, RoAssociativeArray, RoList};
use node::{NodeKindCatalog, RoSGNode};
use pattern::RoRegex;
use string::RoString;
use timespan::RoTimespan;
use xml::{RoXmlElement, RoXmlList};

/// Most items a script may put in one collection.
pub const MAX_ITEMS: usize = 1 << 22;

/// Longest string, in bytes, a script may build.
pub const MAX_STRING_BYTES: usize = 1 << 24;

#[derive(Debug, Clone)]
pub enum Component {
    Array(RoArray),
    AssociativeArray(RoAssociativeArray),
    List(RoList),
    Timespan(RoTimespan),
    Regex(RoRegex),
    String(RoString),
    XmlElement(RoXmlElement),
    XmlList(RoXmlList),
    Node(RoSGNode),
    /// Kinds added through [`registry::ComponentRegistry::register`] with a
    /// custom constructor: a named bag of fields.
    Object(ExtensionObject),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionObject {
    pub kind: String,
    pub fields: IndexMap<String, Value>,
}

impl ExtensionObject {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_ascii_lowercase(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MethodError {
    #[error("'{kind}' has no method '{method}'")]
    UnknownMethod { kind: String, method: String },
    #[error("'{kind}' has no member '{member}'")]
    UnknownMember { kind: String, member: String },
    #[error("{method}() expects {expected} argument(s), found {found}")]
    Arity {
        method: String,
        expected: String,
        found: usize,
    },
    #[error("{method}() argument {position} must be {expected}, found {found}")]
    ArgumentType {
        method: String,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{method}() failed: {reason}")]
    Failed { method: String, reason: String },
    #[error("Use of a released component")]
    Released,
}

/// State a method may touch besides its own component.
pub struct MethodContext<'a> {
    pub heap: &'a mut Heap,
    pub catalog: &'a NodeKindCatalog,
    /// The component whose method runs. It is taken out of the heap for the
    /// duration of the call.
    pub this: ComponentRef,
}

/// Argument list of one method call, with the lowercase method name.
#[derive(Clone, Copy)]
pub struct Arguments<'a> {
    method: &'a str,
    values: &'a [Value],
}

impl<'a> Arguments<'a> {
    pub fn new(method: &'a str, values: &'a [Value]) -> Self {
        Self { method, values }
    }

    pub fn method(&self) -> &'a str {
        self.method
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn expect(&self, count: usize) -> Result<(), MethodError> {
        self.expect_range(count, count)
    }

    pub fn expect_range(&self, min: usize, max: usize) -> Result<(), MethodError> {
        if (min..=max).contains(&self.values.len()) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        Err(MethodError::Arity {
            method: self.method.to_string(),
            expected,
            found: self.values.len(),
        })
    }

    fn type_error(&self, position: usize, expected: &'static str) -> MethodError {
        MethodError::ArgumentType {
            method: self.method.to_string(),
            position: position + 1,
            expected,
            found: self
                .values
                .get(position)
                .map(Value::type_name)
                .unwrap_or("nothing"),
        }
    }

    pub fn value(&self, position: usize) -> Result<Value, MethodError> {
        self.values
            .get(position)
            .cloned()
            .ok_or_else(|| self.type_error(position, "a value"))
    }

    pub fn string(&self, position: usize) -> Result<&'a str, MethodError> {
        match self.values.get(position) {
            Some(Value::String(text)) => Ok(text),
            _ => Err(self.type_error(position, "String")),
        }
    }

    pub fn integer(&self, position: usize) -> Result<i64, MethodError> {
        match self.values.get(position) {
            Some(Value::Integer(value)) => Ok(*value),
            Some(Value::Float(value)) => Ok(*value as i64),
            _ => Err(self.type_error(position, "Integer")),
        }
    }

    pub fn boolean(&self, position: usize) -> Result<bool, MethodError> {
        match self.values.get(position) {
            Some(Value::Boolean(value)) => Ok(*value),
            _ => Err(self.type_error(position, "Boolean")),
        }
    }

    pub fn object(&self, position: usize) -> Result<ComponentRef, MethodError> {
        match self.values.get(position) {
            Some(Value::Object(component)) => Ok(*component),
            _ => Err(self.type_error(position, "Object")),
        }
    }

    pub fn unknown(&self, kind: &str) -> MethodError {
        MethodError::UnknownMethod {
            kind: kind.to_string(),
            method: self.method.to_string(),
        }
    }

    /// Fails unless a collection may grow to `len` items.
    pub fn ensure_items(&self, len: usize) -> Result<(), MethodError> {
        if len > MAX_ITEMS {
            return Err(self.failed(format!("{len} items exceeds the limit of {MAX_ITEMS}")));
        }
        Ok(())
    }

    pub fn ensure_string_bytes(&self, len: usize) -> Result<(), MethodError> {
        if len > MAX_STRING_BYTES {
            return Err(self.failed(format!("{len} bytes exceeds the limit of {MAX_STRING_BYTES}")));
        }
        Ok(())
    }

    pub fn failed(&self, reason: impl Into<String>) -> MethodError {
        MethodError::Failed {
            method: self.method.to_string(),
            reason: reason.into(),
        }
    }
}

impl Component {
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Array(_) => "roArray",
            Self::AssociativeArray(_) => "roAssociativeArray",
            Self::List(_) => "roList",
            Self::Timespan(_) => "roTimespan",
            Self::Regex(_) => "roRegex",
            Self::String(_) => "roString",
            Self::XmlElement(_) => "roXMLElement",
            Self::XmlList(_) => "roXMLList",
            Self::Node(_) => "roSGNode",
            Self::Object(object) => &object.kind,
        }
    }

    /// Components this one points at, for collection.
    pub fn references(&self) -> Vec<ComponentRef> {
        fn objects<'v>(values: impl IntoIterator<Item = &'v Value>) -> Vec<ComponentRef> {
            values.into_iter().filter_map(Value::as_object).collect()
        }
        match self {
            Self::Array(array) => objects(array.items()),
            Self::AssociativeArray(aa) => objects(aa.values()),
            Self::List(list) => objects(list.items()),
            Self::XmlElement(element) => element.references(),
            Self::XmlList(list) => list.elements().to_vec(),
            Self::Node(node) => node.references(),
            Self::Object(object) => objects(object.fields.values()),
            Self::Timespan(_) | Self::Regex(_) | Self::String(_) => Vec::new(),
        }
    }

    fn call(&mut self, args: Arguments<'_>, cx: &mut MethodContext<'_>) -> Result<Value, MethodError> {
        match self {
            Self::Array(array) => array.call(args, cx),
            Self::AssociativeArray(aa) => aa.call(args, cx),
            Self::List(list) => list.call(args),
            Self::Timespan(timespan) => timespan.call(args),
            Self::Regex(regex) => regex.call(args, cx),
            Self::String(string) => string.call(args),
            Self::XmlElement(element) => element.call(args, cx),
            Self::XmlList(list) => list.call(args, cx),
            Self::Node(node) => node.call(args, cx),
            Self::Object(object) => Err(args.unknown(&object.kind)),
        }
    }

    pub fn snapshot(
        &self,
        mut nested: impl FnMut(&Value) -> serde_json::Value,
    ) -> serde_json::Value {
        use serde_json::{Map, Value as Json};
        match self {
            Self::Array(array) => Json::Array(array.items().iter().map(&mut nested).collect()),
            Self::List(list) => Json::Array(list.items().map(&mut nested).collect()),
            Self::AssociativeArray(aa) => Json::Object(
                aa.iter()
                    .map(|(key, value)| (key.to_string(), nested(value)))
                    .collect::<Map<_, _>>(),
            ),
            Self::Timespan(timespan) => {
                serde_json::json!({ "totalMilliseconds": timespan.total_milliseconds() })
            }
            Self::Regex(regex) => serde_json::json!({ "pattern": regex.pattern() }),
            Self::String(string) => Json::String(string.as_str().to_string()),
            Self::XmlElement(element) => element.snapshot(nested),
            Self::XmlList(list) => Json::Array(
                list.elements()
                    .iter()
                    .map(|element| nested(&Value::Object(*element)))
                    .collect(),
            ),
            Self::Node(node) => node.snapshot(nested),
            Self::Object(object) => {
                let mut map = Map::new();
                map.insert("kind".to_string(), Json::String(object.kind.clone()));
                for (name, value) in &object.fields {
                    map.insert(name.clone(), nested(value));
                }
                Json::Object(map)
            }
        }
    }
}

/// Runs `method` on the component behind `this`.
pub fn call_method(
    heap: &mut Heap,
    catalog: &NodeKindCatalog,
    this: ComponentRef,
    method: &str,
    values: &[Value],
) -> Result<Value, MethodError> {
    let mut component = heap.take(this).ok_or(MethodError::Released)?;
    let method = method.to_ascii_lowercase();
    let result = {
        let mut cx = MethodContext {
            heap: &mut *heap,
            catalog,
            this,
        };
        component.call(Arguments::new(&method, values), &mut cx)
    };
    heap.restore(this, component);
    result
}

/// `object.name` read access.
pub fn get_member(heap: &Heap, this: ComponentRef, name: &str) -> Result<Value, MethodError> {
    let component = heap.get(this).ok_or(MethodError::Released)?;
    match component {
        Component::AssociativeArray(aa) => Ok(aa.get(name).cloned().unwrap_or(Value::Invalid)),
        Component::Node(node) => Ok(node.field(name).cloned().unwrap_or(Value::Invalid)),
        Component::Object(object) => Ok(object
            .fields
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or(Value::Invalid)),
        other => Err(MethodError::UnknownMember {
            kind: other.kind_name().to_string(),
            member: name.to_string(),
        }),
    }
}

/// `object.name = value` write access.
pub fn set_member(
    heap: &mut Heap,
    this: ComponentRef,
    name: &str,
    value: Value,
) -> Result<(), MethodError> {
    let component = heap.get_mut(this).ok_or(MethodError::Released)?;
    match component {
        Component::AssociativeArray(aa) => {
            aa.insert(name, value);
            Ok(())
        }
        Component::Node(node) => {
            node.set_field(name, value);
            Ok(())
        }
        Component::Object(object) => {
            object.fields.insert(name.to_ascii_lowercase(), value);
            Ok(())
        }
        other => Err(MethodError::UnknownMember {
            kind: other.kind_name().to_string(),
            member: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_access_on_associative_arrays_ignores_case() {
        let mut heap = Heap::new();
        let aa = heap.alloc(Component::AssociativeArray(RoAssociativeArray::new()));
        set_member(&mut heap, aa, "Title", Value::from("x")).unwrap();
        assert_eq!(get_member(&heap, aa, "TITLE").unwrap(), Value::from("x"));
        assert_eq!(get_member(&heap, aa, "missing").unwrap(), Value::Invalid);
    }

    #[test]
    fn member_access_on_arrays_is_an_error() {
        let mut heap = Heap::new();
        let array = heap.alloc(Component::Array(RoArray::new()));
        assert!(matches!(
            get_member(&heap, array, "length"),
            Err(MethodError::UnknownMember { .. })
        ));
    }

    #[test]
    fn unknown_methods_are_reported() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let array = heap.alloc(Component::Array(RoArray::new()));
        let error = call_method(&mut heap, &catalog, array, "Frobnicate", &[]).unwrap_err();
        assert_eq!(error.to_string(), "'roArray' has no method 'frobnicate'");
        // The component is back in place after a failed call
        assert!(heap.get(array).is_some());
    }

    #[test]
    fn arity_errors_name_the_method() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let array = heap.alloc(Component::Array(RoArray::new()));
        let error = call_method(&mut heap, &catalog, array, "push", &[]).unwrap_err();
        assert_eq!(error.to_string(), "push() expects 1 argument(s), found 0");
    }
}
