//! Scene-graph nodes (`roSGNode`) and the per-run catalog of node kinds.
//!
//! A node's type name is resolved at construction time: the built-in kind
//! table first, then the run's [`NodeKindCatalog`]. A catalog declaration
//! that reuses a built-in name layers its fields over the built-in kind, so
//! redeclaring a built-in at run time is visible to every later creation.

use super::collections::{RoArray, RoAssociativeArray};
use super::registry::CreationFailure;
use super::{Arguments, Component, MethodContext, MethodError};
use crate::runtime::{ComponentRef, Heap, Value};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Longest `extends` chain followed before giving up (cycles included).
const MAX_EXTENDS_DEPTH: usize = 32;

/// A node kind declared by interpreted code.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeKindDefinition {
    pub name: String,
    pub extends: Option<String>,
    pub fields: Vec<(String, Value)>,
}

/// Node kinds declared during one run. Clones share the same table; it is
/// read fresh on every node construction.
#[derive(Debug, Clone, Default)]
pub struct NodeKindCatalog {
    kinds: Rc<RefCell<HashMap<String, NodeKindDefinition>>>,
}

impl NodeKindCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a declaration. Returns the replaced one.
    pub fn declare(&self, definition: NodeKindDefinition) -> Option<NodeKindDefinition> {
        self.kinds
            .borrow_mut()
            .insert(definition.name.to_ascii_lowercase(), definition)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeKindDefinition> {
        self.kinds.borrow().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.borrow().contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.kinds.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.borrow().is_empty()
    }

    /// Components held as declared field defaults.
    pub fn references(&self) -> Vec<ComponentRef> {
        self.kinds
            .borrow()
            .values()
            .flat_map(|definition| definition.fields.iter())
            .filter_map(|(_, value)| value.as_object())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .kinds
            .borrow()
            .values()
            .map(|definition| definition.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldDefault {
    Text(&'static str),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Invalid,
}

impl FieldDefault {
    fn value(self) -> Value {
        match self {
            Self::Text(text) => Value::from(text),
            Self::Integer(value) => Value::Integer(value),
            Self::Float(value) => Value::Float(value),
            Self::Boolean(value) => Value::Boolean(value),
            Self::Invalid => Value::Invalid,
        }
    }
}

struct BuiltinKind {
    name: &'static str,
    extends: Option<&'static str>,
    fields: &'static [(&'static str, FieldDefault)],
}

const BUILTIN_KINDS: &[BuiltinKind] = &[
    BuiltinKind {
        name: "Node",
        extends: None,
        fields: &[
            ("id", FieldDefault::Text("")),
            ("focusable", FieldDefault::Boolean(false)),
            ("focusedChild", FieldDefault::Invalid),
        ],
    },
    BuiltinKind {
        name: "Group",
        extends: Some("Node"),
        fields: &[
            ("visible", FieldDefault::Boolean(true)),
            ("opacity", FieldDefault::Float(1.0)),
            ("translation", FieldDefault::Invalid),
            ("rotation", FieldDefault::Float(0.0)),
        ],
    },
    BuiltinKind {
        name: "LayoutGroup",
        extends: Some("Group"),
        fields: &[
            ("layoutDirection", FieldDefault::Text("vert")),
            ("horizAlignment", FieldDefault::Text("left")),
            ("vertAlignment", FieldDefault::Text("top")),
        ],
    },
    BuiltinKind {
        name: "Rectangle",
        extends: Some("Group"),
        fields: &[
            ("width", FieldDefault::Float(0.0)),
            ("height", FieldDefault::Float(0.0)),
            ("color", FieldDefault::Text("0xFFFFFFFF")),
        ],
    },
    BuiltinKind {
        name: "Label",
        extends: Some("Group"),
        fields: &[
            ("text", FieldDefault::Text("")),
            ("color", FieldDefault::Text("0xDDDDDDFF")),
            ("width", FieldDefault::Float(0.0)),
            ("height", FieldDefault::Float(0.0)),
            ("horizAlign", FieldDefault::Text("left")),
            ("vertAlign", FieldDefault::Text("top")),
            ("wrap", FieldDefault::Boolean(false)),
            ("numLines", FieldDefault::Integer(0)),
        ],
    },
    BuiltinKind {
        name: "Poster",
        extends: Some("Group"),
        fields: &[
            ("uri", FieldDefault::Text("")),
            ("width", FieldDefault::Float(0.0)),
            ("height", FieldDefault::Float(0.0)),
            ("loadStatus", FieldDefault::Text("noScale")),
        ],
    },
    BuiltinKind {
        name: "Scene",
        extends: Some("Group"),
        fields: &[
            ("backgroundColor", FieldDefault::Text("0x000000FF")),
            ("backgroundUri", FieldDefault::Text("")),
            ("backExitsScene", FieldDefault::Boolean(true)),
        ],
    },
    BuiltinKind {
        name: "ContentNode",
        extends: Some("Node"),
        fields: &[
            ("title", FieldDefault::Text("")),
            ("description", FieldDefault::Text("")),
            ("url", FieldDefault::Text("")),
            ("streamFormat", FieldDefault::Text("")),
        ],
    },
    BuiltinKind {
        name: "Timer",
        extends: Some("Node"),
        fields: &[
            ("control", FieldDefault::Text("none")),
            ("repeat", FieldDefault::Boolean(false)),
            ("duration", FieldDefault::Float(0.0)),
            ("fire", FieldDefault::Invalid),
        ],
    },
    BuiltinKind {
        name: "Font",
        extends: Some("Node"),
        fields: &[
            ("uri", FieldDefault::Text("")),
            ("size", FieldDefault::Integer(1)),
        ],
    },
];

fn builtin_kind(name: &str) -> Option<&'static BuiltinKind> {
    BUILTIN_KINDS
        .iter()
        .find(|kind| kind.name.eq_ignore_ascii_case(name))
}

pub fn is_builtin_kind(name: &str) -> bool {
    builtin_kind(name).is_some()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeField {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct ResolvedKind {
    subtype: String,
    // most derived first
    ancestry: Vec<String>,
    fields: IndexMap<String, NodeField>,
}

impl ResolvedKind {
    fn overlay(&mut self, name: &str, value: Value) {
        let key = name.to_ascii_lowercase();
        match self.fields.get_mut(&key) {
            Some(field) => field.value = value,
            None => {
                self.fields.insert(
                    key,
                    NodeField {
                        name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }
}

fn resolve(
    name: &str,
    catalog: &NodeKindCatalog,
    depth: usize,
) -> Result<ResolvedKind, CreationFailure> {
    if depth > MAX_EXTENDS_DEPTH {
        return Err(CreationFailure::invalid(
            "roSGNode",
            format!("extends chain of '{name}' is cyclic or too deep"),
        ));
    }
    let declared = catalog.lookup(name);

    let mut resolved = if let Some(builtin) = builtin_kind(name) {
        let mut resolved = match builtin.extends {
            Some(parent) => resolve(parent, catalog, depth + 1)?,
            None => ResolvedKind::default(),
        };
        if let Some(declaration) = &declared
            && let Some(extends) = &declaration.extends
        {
            log::warn!(
                "Declaration of built-in node kind '{}' cannot change its base to '{extends}'",
                builtin.name
            );
        }
        resolved.subtype = builtin.name.to_string();
        resolved.ancestry.insert(0, builtin.name.to_string());
        for (field, default) in builtin.fields {
            resolved.overlay(field, default.value());
        }
        resolved
    } else if let Some(declaration) = &declared {
        let base = declaration.extends.as_deref().unwrap_or("Node");
        let mut resolved = resolve(base, catalog, depth + 1)?;
        resolved.subtype = declaration.name.clone();
        resolved.ancestry.insert(0, declaration.name.clone());
        resolved
    } else {
        return Err(CreationFailure::invalid(
            "roSGNode",
            format!("unknown node type '{name}'"),
        ));
    };

    if let Some(declaration) = declared {
        for (field, value) in declaration.fields {
            resolved.overlay(&field, value);
        }
    }
    Ok(resolved)
}

/// Builds a node of `type_name` from the built-in kinds and the run's
/// catalog as they are right now.
pub fn create_node(type_name: &str, catalog: &NodeKindCatalog) -> Result<RoSGNode, CreationFailure> {
    let resolved = resolve(type_name, catalog, 0)?;
    Ok(RoSGNode {
        subtype: resolved.subtype,
        ancestry: resolved.ancestry,
        fields: resolved.fields,
        children: Vec::new(),
        parent: None,
    })
}

#[derive(Debug, Clone)]
pub struct RoSGNode {
    subtype: String,
    ancestry: Vec<String>,
    fields: IndexMap<String, NodeField>,
    children: Vec<ComponentRef>,
    parent: Option<ComponentRef>,
}

impl RoSGNode {
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn is_subtype(&self, name: &str) -> bool {
        self.ancestry
            .iter()
            .any(|kind| kind.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|field| &field.value)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    /// Sets a field, adding it when missing.
    pub fn set_field(&mut self, name: &str, value: Value) {
        let key = name.to_ascii_lowercase();
        match self.fields.get_mut(&key) {
            Some(field) => field.value = value,
            None => {
                self.fields.insert(
                    key,
                    NodeField {
                        name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &NodeField> {
        self.fields.values()
    }

    pub fn children(&self) -> &[ComponentRef] {
        &self.children
    }

    pub fn parent(&self) -> Option<ComponentRef> {
        self.parent
    }

    pub(super) fn references(&self) -> Vec<ComponentRef> {
        self.fields
            .values()
            .filter_map(|field| field.value.as_object())
            .chain(self.children.iter().copied())
            .chain(self.parent)
            .collect()
    }

    fn append_child(
        &mut self,
        child: ComponentRef,
        cx: &mut MethodContext<'_>,
    ) -> Result<bool, String> {
        // A node can't become its own descendant
        let mut ancestor = self.parent;
        while let Some(current) = ancestor {
            if current == child {
                return Ok(false);
            }
            ancestor = match cx.heap.get(current) {
                Some(Component::Node(node)) => node.parent,
                _ => None,
            };
        }
        if child == cx.this {
            return Ok(false);
        }
        let previous_parent = match cx.heap.get(child) {
            Some(Component::Node(node)) => node.parent,
            Some(other) => return Err(format!("cannot append {} as a child", other.kind_name())),
            None => return Ok(false),
        };
        match previous_parent {
            Some(parent) if parent == cx.this => self.children.retain(|existing| *existing != child),
            Some(parent) => {
                if let Some(Component::Node(parent)) = cx.heap.get_mut(parent) {
                    parent.children.retain(|existing| *existing != child);
                }
            }
            None => {}
        }
        if let Some(Component::Node(node)) = cx.heap.get_mut(child) {
            node.parent = Some(cx.this);
        }
        self.children.push(child);
        Ok(true)
    }

    fn remove_child(&mut self, child: ComponentRef, heap: &mut Heap) -> bool {
        let Some(position) = self.children.iter().position(|existing| *existing == child) else {
            return false;
        };
        self.children.remove(position);
        if let Some(Component::Node(node)) = heap.get_mut(child) {
            node.parent = None;
        }
        true
    }

    fn find_node(&self, heap: &Heap, id: &str) -> Option<ComponentRef> {
        self.children.iter().copied().find_map(|child| match heap.get(child) {
            Some(Component::Node(node)) => {
                if node.field("id").and_then(Value::as_str) == Some(id) {
                    Some(child)
                } else {
                    node.find_node(heap, id)
                }
            }
            _ => None,
        })
    }

    pub(super) fn call(
        &mut self,
        args: Arguments<'_>,
        cx: &mut MethodContext<'_>,
    ) -> Result<Value, MethodError> {
        match args.method() {
            "subtype" => {
                args.expect(0)?;
                Ok(Value::String(self.subtype.clone()))
            }
            "issubtype" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.is_subtype(args.string(0)?)))
            }
            "getfield" => {
                args.expect(1)?;
                Ok(self.field(args.string(0)?).cloned().unwrap_or(Value::Invalid))
            }
            "setfield" => {
                args.expect(2)?;
                let name = args.string(0)?;
                if !self.has_field(name) {
                    return Ok(Value::Boolean(false));
                }
                self.set_field(name, args.value(1)?);
                Ok(Value::Boolean(true))
            }
            "hasfield" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.has_field(args.string(0)?)))
            }
            "addfield" => {
                args.expect_range(2, 3)?;
                let name = args.string(0)?;
                if self.has_field(name) {
                    return Ok(Value::Boolean(false));
                }
                let value = match args.string(1)?.to_ascii_lowercase().as_str() {
                    "string" | "str" | "uri" | "color" => Value::from(""),
                    "integer" | "int" => Value::Integer(0),
                    "float" => Value::Float(0.0),
                    "boolean" | "bool" => Value::Boolean(false),
                    _ => Value::Invalid,
                };
                self.set_field(name, value);
                Ok(Value::Boolean(true))
            }
            "removefield" => {
                args.expect(1)?;
                let removed = self
                    .fields
                    .shift_remove(&args.string(0)?.to_ascii_lowercase())
                    .is_some();
                Ok(Value::Boolean(removed))
            }
            "getfields" => {
                args.expect(0)?;
                let mut fields = RoAssociativeArray::new();
                for field in self.fields.values() {
                    fields.insert(&field.name, field.value.clone());
                }
                Ok(Value::Object(
                    cx.heap.alloc(Component::AssociativeArray(fields)),
                ))
            }
            "setfields" | "addfields" => {
                args.expect(1)?;
                let adding = args.method() == "addfields";
                let Some(Component::AssociativeArray(values)) = cx.heap.get(args.object(0)?)
                else {
                    return Err(args.failed("argument must be an roAssociativeArray"));
                };
                for (name, value) in values.iter() {
                    if adding || self.has_field(name) {
                        self.set_field(name, value.clone());
                    }
                }
                Ok(Value::Boolean(true))
            }
            "appendchild" => {
                args.expect(1)?;
                let appended = self
                    .append_child(args.object(0)?, cx)
                    .map_err(|reason| args.failed(reason))?;
                Ok(Value::Boolean(appended))
            }
            "createchild" => {
                args.expect(1)?;
                let node = match create_node(args.string(0)?, cx.catalog) {
                    Ok(node) => node,
                    Err(failure) => {
                        log::debug!("createChild failed: {failure}");
                        return Ok(Value::Invalid);
                    }
                };
                let child = cx.heap.alloc(Component::Node(node));
                self.append_child(child, cx)
                    .map_err(|reason| args.failed(reason))?;
                Ok(Value::Object(child))
            }
            "removechild" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.remove_child(args.object(0)?, cx.heap)))
            }
            "getchildcount" => {
                args.expect(0)?;
                Ok(Value::Integer(self.children.len() as i64))
            }
            "getchild" => {
                args.expect(1)?;
                let index = usize::try_from(args.integer(0)?).ok();
                Ok(index
                    .and_then(|index| self.children.get(index))
                    .copied()
                    .map_or(Value::Invalid, Value::Object))
            }
            "getchildren" => {
                args.expect(2)?;
                let count = args.integer(0)?;
                let start = usize::try_from(args.integer(1)?).unwrap_or(0);
                let selected = self.children.iter().skip(start);
                let selected: Vec<Value> = match usize::try_from(count) {
                    Ok(count) => selected.take(count).copied().map(Value::Object).collect(),
                    Err(_) => selected.copied().map(Value::Object).collect(),
                };
                Ok(Value::Object(
                    cx.heap.alloc(Component::Array(RoArray::from(selected))),
                ))
            }
            "getparent" => {
                args.expect(0)?;
                Ok(self.parent.map_or(Value::Invalid, Value::Object))
            }
            "findnode" => {
                args.expect(1)?;
                Ok(self
                    .find_node(cx.heap, args.string(0)?)
                    .map_or(Value::Invalid, Value::Object))
            }
            _ => Err(args.unknown("roSGNode")),
        }
    }

    pub(super) fn snapshot(
        &self,
        mut nested: impl FnMut(&Value) -> serde_json::Value,
    ) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .values()
            .map(|field| (field.name.clone(), nested(&field.value)))
            .collect();
        let children: Vec<serde_json::Value> = self
            .children
            .iter()
            .map(|child| nested(&Value::Object(*child)))
            .collect();
        serde_json::json!({
            "subtype": self.subtype,
            "fields": fields,
            "children": children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::call_method;

    fn label_definition(text: &str) -> NodeKindDefinition {
        NodeKindDefinition {
            name: "Label".to_string(),
            extends: None,
            fields: vec![("text".to_string(), Value::from(text))],
        }
    }

    #[test]
    fn builtin_kinds_inherit_fields() {
        let node = create_node("label", &NodeKindCatalog::new()).unwrap();
        assert_eq!(node.subtype(), "Label");
        assert!(node.is_subtype("Group"));
        assert!(node.is_subtype("node"));
        assert_eq!(node.field("visible"), Some(&Value::Boolean(true)));
        assert_eq!(node.field("TEXT"), Some(&Value::from("")));
    }

    #[test]
    fn unknown_kind_fails() {
        let failure = create_node("Sprocket", &NodeKindCatalog::new()).unwrap_err();
        assert!(failure.to_string().contains("Sprocket"));
    }

    #[test]
    fn declared_kinds_extend_other_kinds() {
        let catalog = NodeKindCatalog::new();
        catalog.declare(NodeKindDefinition {
            name: "Badge".to_string(),
            extends: Some("Label".to_string()),
            fields: vec![("text".to_string(), Value::from("NEW")), ("count".to_string(), Value::Integer(3))],
        });
        let badge = create_node("badge", &catalog).unwrap();
        assert_eq!(badge.subtype(), "Badge");
        assert!(badge.is_subtype("Label"));
        assert_eq!(badge.field("text"), Some(&Value::from("NEW")));
        assert_eq!(badge.field("count"), Some(&Value::Integer(3)));
        assert_eq!(badge.field("wrap"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn redeclaring_a_builtin_is_seen_by_later_creations() {
        let catalog = NodeKindCatalog::new();
        let before = create_node("Label", &catalog).unwrap();
        catalog.declare(label_definition("redefined"));
        let after = create_node("Label", &catalog.clone()).unwrap();

        assert_eq!(before.field("text"), Some(&Value::from("")));
        assert_eq!(after.subtype(), "Label");
        assert_eq!(after.field("text"), Some(&Value::from("redefined")));
    }

    #[test]
    fn cyclic_extends_fails() {
        let catalog = NodeKindCatalog::new();
        for (name, base) in [("A", "B"), ("B", "A")] {
            catalog.declare(NodeKindDefinition {
                name: name.to_string(),
                extends: Some(base.to_string()),
                fields: Vec::new(),
            });
        }
        assert!(create_node("A", &catalog).is_err());
    }

    #[test]
    fn catalog_clones_share_declarations() {
        let catalog = NodeKindCatalog::new();
        let shared = catalog.clone();
        assert!(catalog.declare(label_definition("a")).is_none());
        assert!(shared.contains("LABEL"));
        assert_eq!(shared.declare(label_definition("b")), Some(label_definition("a")));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.names(), vec!["Label".to_string()]);
    }

    #[test]
    fn children_move_between_parents() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let first = heap.alloc(Component::Node(create_node("Group", &catalog).unwrap()));
        let second = heap.alloc(Component::Node(create_node("Group", &catalog).unwrap()));
        let child = heap.alloc(Component::Node(create_node("Label", &catalog).unwrap()));

        let appended =
            call_method(&mut heap, &catalog, first, "appendChild", &[Value::Object(child)]);
        assert_eq!(appended, Ok(Value::Boolean(true)));
        call_method(&mut heap, &catalog, second, "appendChild", &[Value::Object(child)]).unwrap();

        let count = |heap: &mut Heap, node| {
            call_method(heap, &catalog, node, "getChildCount", &[]).unwrap()
        };
        assert_eq!(count(&mut heap, first), Value::Integer(0));
        assert_eq!(count(&mut heap, second), Value::Integer(1));
        assert_eq!(
            call_method(&mut heap, &catalog, child, "getParent", &[]).unwrap(),
            Value::Object(second)
        );
        assert_eq!(
            call_method(&mut heap, &catalog, first, "appendChild", &[Value::Object(first)]),
            Ok(Value::Boolean(false))
        );
    }

    #[test]
    fn create_child_and_find_node() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let scene = heap.alloc(Component::Node(create_node("Scene", &catalog).unwrap()));
        let group = call_method(&mut heap, &catalog, scene, "createChild", &[Value::from("Group")])
            .unwrap()
            .as_object()
            .unwrap();
        let label = call_method(&mut heap, &catalog, group, "createChild", &[Value::from("Label")])
            .unwrap()
            .as_object()
            .unwrap();
        call_method(
            &mut heap,
            &catalog,
            label,
            "setField",
            &[Value::from("id"), Value::from("title")],
        )
        .unwrap();

        assert_eq!(
            call_method(&mut heap, &catalog, scene, "findNode", &[Value::from("title")]).unwrap(),
            Value::Object(label)
        );
        assert_eq!(
            call_method(&mut heap, &catalog, scene, "createChild", &[Value::from("Nope")]).unwrap(),
            Value::Invalid
        );
    }

    #[test]
    fn set_field_only_updates_existing_fields() {
        let mut heap = Heap::new();
        let catalog = NodeKindCatalog::new();
        let node = heap.alloc(Component::Node(create_node("Node", &catalog).unwrap()));
        let mut call = |method: &str, values: &[Value]| {
            call_method(&mut heap, &catalog, node, method, values).unwrap()
        };

        assert_eq!(
            call("setField", &[Value::from("missing"), Value::Integer(1)]),
            Value::Boolean(false)
        );
        assert_eq!(
            call("addField", &[Value::from("score"), Value::from("integer"), Value::Boolean(false)]),
            Value::Boolean(true)
        );
        assert_eq!(call("getField", &[Value::from("score")]), Value::Integer(0));
        assert_eq!(
            call("setField", &[Value::from("Score"), Value::Integer(7)]),
            Value::Boolean(true)
        );
        assert_eq!(call("getField", &[Value::from("score")]), Value::Integer(7));
    }
}
