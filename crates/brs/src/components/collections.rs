use super::{Arguments, Component, MethodContext, MethodError};
use crate::runtime::Value;
use indexmap::IndexMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoArray {
    items: Vec<Value>,
}

impl From<Vec<Value>> for RoArray {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl RoArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(super) fn call(
        &mut self,
        args: Arguments<'_>,
        cx: &mut MethodContext<'_>,
    ) -> Result<Value, MethodError> {
        match args.method() {
            "push" => {
                args.expect(1)?;
                self.items.push(args.value(0)?);
                Ok(Value::Invalid)
            }
            "pop" => {
                args.expect(0)?;
                Ok(self.items.pop().unwrap_or(Value::Invalid))
            }
            "unshift" => {
                args.expect(1)?;
                self.items.insert(0, args.value(0)?);
                Ok(Value::Invalid)
            }
            "shift" => {
                args.expect(0)?;
                if self.items.is_empty() {
                    Ok(Value::Invalid)
                } else {
                    Ok(self.items.remove(0))
                }
            }
            "count" => {
                args.expect(0)?;
                Ok(Value::Integer(self.items.len() as i64))
            }
            "isempty" => {
                args.expect(0)?;
                Ok(Value::Boolean(self.items.is_empty()))
            }
            "clear" => {
                args.expect(0)?;
                self.items.clear();
                Ok(Value::Invalid)
            }
            "getentry" => {
                args.expect(1)?;
                let index = args.integer(0)?;
                Ok(usize::try_from(index)
                    .ok()
                    .and_then(|index| self.items.get(index).cloned())
                    .unwrap_or(Value::Invalid))
            }
            "setentry" => {
                args.expect(2)?;
                let index = usize::try_from(args.integer(0)?)
                    .map_err(|_| args.failed("index must not be negative"))?;
                let value = args.value(1)?;
                if index >= self.items.len() {
                    args.ensure_items(index.saturating_add(1))?;
                    self.items.resize(index + 1, Value::Invalid);
                }
                self.items[index] = value;
                Ok(Value::Invalid)
            }
            "append" => {
                args.expect(1)?;
                let other = args.object(0)?;
                let appended = if other == cx.this {
                    self.items.clone()
                } else {
                    match cx.heap.get(other) {
                        Some(Component::Array(array)) => array.items.clone(),
                        _ => return Err(args.failed("argument must be an roArray")),
                    }
                };
                args.ensure_items(self.items.len() + appended.len())?;
                self.items.extend(appended);
                Ok(Value::Invalid)
            }
            "reverse" => {
                args.expect(0)?;
                self.items.reverse();
                Ok(Value::Invalid)
            }
            "join" => {
                args.expect(1)?;
                let separator = args.string(0)?;
                let parts: Option<Vec<&str>> = self.items.iter().map(Value::as_str).collect();
                Ok(Value::String(
                    parts.map(|parts| parts.join(separator)).unwrap_or_default(),
                ))
            }
            _ => Err(args.unknown("roArray")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    value: Value,
}

/// Insertion-ordered map with case-insensitive keys. The spelling of the
/// first insertion is kept for enumeration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoAssociativeArray {
    entries: IndexMap<String, Entry>,
}

impl RoAssociativeArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        let normalized = key.to_ascii_lowercase();
        match self.entries.get_mut(&normalized) {
            Some(entry) => entry.value = value,
            None => {
                self.entries.insert(
                    normalized,
                    Entry {
                        key: key.to_string(),
                        value,
                    },
                );
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|entry| &entry.value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries
            .shift_remove(&key.to_ascii_lowercase())
            .map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), &entry.value))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|entry| &entry.value)
    }

    pub(super) fn call(
        &mut self,
        args: Arguments<'_>,
        cx: &mut MethodContext<'_>,
    ) -> Result<Value, MethodError> {
        match args.method() {
            "addreplace" => {
                args.expect(2)?;
                self.insert(args.string(0)?, args.value(1)?);
                Ok(Value::Invalid)
            }
            "lookup" | "lookupci" => {
                args.expect(1)?;
                Ok(self.get(args.string(0)?).cloned().unwrap_or(Value::Invalid))
            }
            "doesexist" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.get(args.string(0)?).is_some()))
            }
            "delete" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.remove(args.string(0)?).is_some()))
            }
            "count" => {
                args.expect(0)?;
                Ok(Value::Integer(self.entries.len() as i64))
            }
            "isempty" => {
                args.expect(0)?;
                Ok(Value::Boolean(self.entries.is_empty()))
            }
            "clear" => {
                args.expect(0)?;
                self.entries.clear();
                Ok(Value::Invalid)
            }
            "keys" => {
                args.expect(0)?;
                let keys = self
                    .entries
                    .values()
                    .map(|entry| Value::String(entry.key.clone()))
                    .collect::<Vec<_>>();
                Ok(Value::Object(
                    cx.heap.alloc(Component::Array(RoArray::from(keys))),
                ))
            }
            "items" => {
                args.expect(0)?;
                let mut items = Vec::with_capacity(self.entries.len());
                for entry in self.entries.values() {
                    let mut item = RoAssociativeArray::new();
                    item.insert("key", Value::String(entry.key.clone()));
                    item.insert("value", entry.value.clone());
                    items.push(Value::Object(
                        cx.heap.alloc(Component::AssociativeArray(item)),
                    ));
                }
                Ok(Value::Object(
                    cx.heap.alloc(Component::Array(RoArray::from(items))),
                ))
            }
            "append" => {
                args.expect(1)?;
                let other = args.object(0)?;
                if other == cx.this {
                    return Ok(Value::Invalid);
                }
                let Some(Component::AssociativeArray(other)) = cx.heap.get(other) else {
                    return Err(args.failed("argument must be an roAssociativeArray"));
                };
                let entries: Vec<Entry> = other.entries.values().cloned().collect();
                for entry in entries {
                    self.insert(&entry.key, entry.value);
                }
                Ok(Value::Invalid)
            }
            _ => Err(args.unknown("roAssociativeArray")),
        }
    }
}

/// Double-ended list with constant-time head and tail operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoList {
    items: VecDeque<Value>,
}

impl RoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(super) fn call(&mut self, args: Arguments<'_>) -> Result<Value, MethodError> {
        match args.method() {
            "addhead" | "unshift" => {
                args.expect(1)?;
                self.items.push_front(args.value(0)?);
                Ok(Value::Invalid)
            }
            "addtail" | "push" => {
                args.expect(1)?;
                self.items.push_back(args.value(0)?);
                Ok(Value::Invalid)
            }
            "removehead" | "shift" => {
                args.expect(0)?;
                Ok(self.items.pop_front().unwrap_or(Value::Invalid))
            }
            "removetail" | "pop" => {
                args.expect(0)?;
                Ok(self.items.pop_back().unwrap_or(Value::Invalid))
            }
            "gethead" => {
                args.expect(0)?;
                Ok(self.items.front().cloned().unwrap_or(Value::Invalid))
            }
            "gettail" => {
                args.expect(0)?;
                Ok(self.items.back().cloned().unwrap_or(Value::Invalid))
            }
            "getentry" => {
                args.expect(1)?;
                Ok(usize::try_from(args.integer(0)?)
                    .ok()
                    .and_then(|index| self.items.get(index).cloned())
                    .unwrap_or(Value::Invalid))
            }
            "count" => {
                args.expect(0)?;
                Ok(Value::Integer(self.items.len() as i64))
            }
            "isempty" => {
                args.expect(0)?;
                Ok(Value::Boolean(self.items.is_empty()))
            }
            "clear" => {
                args.expect(0)?;
                self.items.clear();
                Ok(Value::Invalid)
            }
            _ => Err(args.unknown("roList")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::call_method;
    use crate::components::node::NodeKindCatalog;
    use crate::runtime::Heap;

    #[test]
    fn array_push_pop_and_entries() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let array = heap.alloc(Component::Array(RoArray::new()));
        let mut call = |method: &str, args: &[Value]| {
            call_method(&mut heap, &catalog, array, method, args).unwrap()
        };

        call("Push", &[Value::Integer(1)]);
        call("push", &[Value::Integer(2)]);
        call("unshift", &[Value::Integer(0)]);
        assert_eq!(call("count", &[]), Value::Integer(3));
        assert_eq!(call("getEntry", &[Value::Integer(1)]), Value::Integer(1));
        assert_eq!(call("getEntry", &[Value::Integer(9)]), Value::Invalid);
        assert_eq!(call("pop", &[]), Value::Integer(2));
        assert_eq!(call("shift", &[]), Value::Integer(0));
        call("setEntry", &[Value::Integer(3), Value::from("x")]);
        assert_eq!(call("count", &[]), Value::Integer(4));
        assert_eq!(call("getEntry", &[Value::Integer(2)]), Value::Invalid);
    }

    #[test]
    fn array_growth_is_bounded() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let array = heap.alloc(Component::Array(RoArray::from(vec![Value::Integer(1)])));

        let result = call_method(
            &mut heap,
            &catalog,
            array,
            "SetEntry",
            &[Value::Integer(100_000_000_000), Value::Integer(1)],
        );
        assert!(matches!(result, Err(MethodError::Failed { .. })));
        assert_eq!(
            call_method(&mut heap, &catalog, array, "count", &[]).unwrap(),
            Value::Integer(1)
        );

        let edge = Value::Integer(crate::components::MAX_ITEMS as i64);
        assert!(call_method(&mut heap, &catalog, array, "SetEntry", &[edge, Value::Invalid]).is_err());
    }

    #[test]
    fn array_join_requires_strings() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let words = heap.alloc(Component::Array(RoArray::from(vec![
            Value::from("a"),
            Value::from("b"),
        ])));
        assert_eq!(
            call_method(&mut heap, &catalog, words, "join", &[Value::from("-")]).unwrap(),
            Value::from("a-b")
        );
    }

    #[test]
    fn associative_array_keeps_insertion_order_and_first_spelling() {
        let mut aa = RoAssociativeArray::new();
        aa.insert("Zeta", Value::Integer(1));
        aa.insert("alpha", Value::Integer(2));
        aa.insert("ZETA", Value::Integer(3));

        let entries: Vec<(&str, &Value)> = aa.iter().collect();
        assert_eq!(
            entries,
            vec![("Zeta", &Value::Integer(3)), ("alpha", &Value::Integer(2))]
        );
        assert_eq!(aa.remove("zeta"), Some(Value::Integer(3)));
        assert_eq!(aa.len(), 1);
    }

    #[test]
    fn associative_array_keys_allocates_an_array() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let mut aa = RoAssociativeArray::new();
        aa.insert("one", Value::Integer(1));
        aa.insert("two", Value::Integer(2));
        let aa = heap.alloc(Component::AssociativeArray(aa));

        let keys = call_method(&mut heap, &catalog, aa, "keys", &[]).unwrap();
        let Some(Component::Array(keys)) = keys.as_object().and_then(|keys| heap.get(keys))
        else {
            panic!("keys() should return an roArray");
        };
        assert_eq!(keys.items(), &[Value::from("one"), Value::from("two")]);
        assert_eq!(
            call_method(&mut heap, &catalog, aa, "doesExist", &[Value::from("ONE")]).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn list_head_and_tail() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let list = heap.alloc(Component::List(RoList::new()));
        let mut call = |method: &str, args: &[Value]| {
            call_method(&mut heap, &catalog, list, method, args).unwrap()
        };

        call("addTail", &[Value::Integer(2)]);
        call("addHead", &[Value::Integer(1)]);
        call("addTail", &[Value::Integer(3)]);
        assert_eq!(call("getHead", &[]), Value::Integer(1));
        assert_eq!(call("getTail", &[]), Value::Integer(3));
        assert_eq!(call("removeHead", &[]), Value::Integer(1));
        assert_eq!(call("removeTail", &[]), Value::Integer(3));
        assert_eq!(call("count", &[]), Value::Integer(1));
        call("clear", &[]);
        assert_eq!(call("removeTail", &[]), Value::Invalid);
    }
}
