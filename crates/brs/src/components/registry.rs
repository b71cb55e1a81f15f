use super::collections::{RoArray, RoAssociativeArray, RoList};
use super::node::{NodeKindCatalog, create_node};
use super::pattern::RoRegex;
use super::string::RoString;
use super::timespan::RoTimespan;
use super::xml::{RoXmlElement, RoXmlList};
use super::Component;
use crate::runtime::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Everything a constructor may read besides its arguments.
#[derive(Clone, Copy)]
pub struct CreationContext<'a> {
    pub catalog: &'a NodeKindCatalog,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CreationFailure {
    #[error("Unknown component kind '{kind}'")]
    UnknownKind { kind: String },
    #[error("{kind} expects {expected} argument(s), found {found}")]
    Arity {
        kind: String,
        expected: String,
        found: usize,
    },
    #[error("{kind} argument {position} must be {expected}, found {found}")]
    ArgumentType {
        kind: String,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{kind} could not be created: {reason}")]
    Invalid { kind: String, reason: String },
}

impl CreationFailure {
    pub fn invalid(kind: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

pub type CustomConstructor = Arc<
    dyn Fn(&[Value], &CreationContext<'_>) -> Result<Component, CreationFailure> + Send + Sync,
>;

/// How a kind is built from `CreateObject` arguments. Each variant fixes
/// its own argument contract.
#[derive(Clone)]
pub enum Constructor {
    /// No arguments.
    Plain(fn() -> Component),
    /// One string.
    Text(fn(&str) -> Result<Component, String>),
    /// Zero or one string.
    OptionalText(fn(Option<&str>) -> Result<Component, String>),
    /// Two strings.
    TextPair(fn(&str, &str) -> Result<Component, String>),
    /// A node type name, resolved against the run's catalog.
    Node(fn(&str, &NodeKindCatalog) -> Result<Component, CreationFailure>),
    /// Validates its own arguments.
    Custom(CustomConstructor),
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Plain(_) => "Plain",
            Self::Text(_) => "Text",
            Self::OptionalText(_) => "OptionalText",
            Self::TextPair(_) => "TextPair",
            Self::Node(_) => "Node",
            Self::Custom(_) => "Custom",
        };
        write!(f, "Constructor::{name}")
    }
}

fn check_arity(kind: &str, args: &[Value], min: usize, max: usize) -> Result<(), CreationFailure> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    Err(CreationFailure::Arity {
        kind: kind.to_string(),
        expected: if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        },
        found: args.len(),
    })
}

fn text_argument<'v>(kind: &str, args: &'v [Value], position: usize) -> Result<&'v str, CreationFailure> {
    match args.get(position) {
        Some(Value::String(text)) => Ok(text),
        other => Err(CreationFailure::ArgumentType {
            kind: kind.to_string(),
            position: position + 1,
            expected: "String",
            found: other.map(Value::type_name).unwrap_or("nothing"),
        }),
    }
}

impl Constructor {
    fn construct(
        &self,
        kind: &str,
        args: &[Value],
        cx: &CreationContext<'_>,
    ) -> Result<Component, CreationFailure> {
        let invalid = |reason: String| CreationFailure::invalid(kind, reason);
        match self {
            Self::Plain(build) => {
                check_arity(kind, args, 0, 0)?;
                Ok(build())
            }
            Self::Text(build) => {
                check_arity(kind, args, 1, 1)?;
                build(text_argument(kind, args, 0)?).map_err(invalid)
            }
            Self::OptionalText(build) => {
                check_arity(kind, args, 0, 1)?;
                let text = match args.is_empty() {
                    true => None,
                    false => Some(text_argument(kind, args, 0)?),
                };
                build(text).map_err(invalid)
            }
            Self::TextPair(build) => {
                check_arity(kind, args, 2, 2)?;
                build(text_argument(kind, args, 0)?, text_argument(kind, args, 1)?)
                    .map_err(invalid)
            }
            Self::Node(build) => {
                check_arity(kind, args, 1, 1)?;
                build(text_argument(kind, args, 0)?, cx.catalog)
            }
            Self::Custom(build) => build(args, cx),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub kind_name: String,
    pub constructor: Constructor,
}

/// Kind name → constructor. Names match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: HashMap<String, ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "roArray",
            Constructor::Custom(Arc::new(|args: &[Value], _: &CreationContext<'_>| {
                // (capacity, resizable) hints are accepted and ignored
                match args {
                    [] | [Value::Integer(_), Value::Boolean(_)] => {
                        Ok(Component::Array(RoArray::new()))
                    }
                    _ => Err(CreationFailure::Arity {
                        kind: "roArray".to_string(),
                        expected: "0 or 2".to_string(),
                        found: args.len(),
                    }),
                }
            })),
        );
        registry.register(
            "roAssociativeArray",
            Constructor::Plain(|| Component::AssociativeArray(RoAssociativeArray::new())),
        );
        registry.register("roList", Constructor::Plain(|| Component::List(RoList::new())));
        registry.register(
            "roTimespan",
            Constructor::Plain(|| Component::Timespan(RoTimespan::new())),
        );
        registry.register(
            "roRegex",
            Constructor::TextPair(|pattern, flags| {
                RoRegex::new(pattern, flags).map(Component::Regex)
            }),
        );
        registry.register(
            "roString",
            Constructor::OptionalText(|text| {
                Ok(Component::String(RoString::new(text.unwrap_or_default())))
            }),
        );
        registry.register(
            "roXMLElement",
            Constructor::Plain(|| Component::XmlElement(RoXmlElement::new())),
        );
        registry.register(
            "roXMLList",
            Constructor::Plain(|| Component::XmlList(RoXmlList::new())),
        );
        registry.register(
            "roSGNode",
            Constructor::Node(|type_name, catalog| {
                create_node(type_name, catalog).map(Component::Node)
            }),
        );
        registry
    }

    /// Process-wide registry of the built-in kinds.
    pub fn global() -> &'static ComponentRegistry {
        static GLOBAL: OnceLock<ComponentRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::with_builtins)
    }

    /// Adds a kind, replacing any kind with the same (case-insensitive) name.
    pub fn register(
        &mut self,
        kind_name: &str,
        constructor: Constructor,
    ) -> Option<ComponentDescriptor> {
        self.descriptors.insert(
            kind_name.to_ascii_lowercase(),
            ComponentDescriptor {
                kind_name: kind_name.to_string(),
                constructor,
            },
        )
    }

    pub fn descriptor(&self, kind_name: &str) -> Option<&ComponentDescriptor> {
        self.descriptors.get(&kind_name.to_ascii_lowercase())
    }

    pub fn contains(&self, kind_name: &str) -> bool {
        self.descriptor(kind_name).is_some()
    }

    pub fn kind_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .descriptors
            .values()
            .map(|descriptor| descriptor.kind_name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Builds a component. Never mutates the registry or the catalog.
    pub fn create(
        &self,
        kind_name: &str,
        args: &[Value],
        cx: &CreationContext<'_>,
    ) -> Result<Component, CreationFailure> {
        let descriptor = self
            .descriptor(kind_name)
            .ok_or_else(|| CreationFailure::UnknownKind {
                kind: kind_name.to_string(),
            })?;
        descriptor
            .constructor
            .construct(&descriptor.kind_name, args, cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ExtensionObject;
    use crate::components::node::NodeKindDefinition;

    fn create(kind: &str, args: &[Value]) -> Result<Component, CreationFailure> {
        let catalog = NodeKindCatalog::new();
        ComponentRegistry::global().create(kind, args, &CreationContext { catalog: &catalog })
    }

    #[test]
    fn regex_kind_name_is_case_insensitive() {
        let Ok(Component::Regex(regex)) =
            create("RoRegex", &[Value::from("a.*b"), Value::from("i")])
        else {
            panic!("expected roRegex");
        };
        assert!(regex.is_match("xAyB"));
        assert_eq!(regex.flags(), "i");
    }

    #[test]
    fn unknown_kind_fails() {
        assert_eq!(
            create("NotAKind", &[]).unwrap_err(),
            CreationFailure::UnknownKind {
                kind: "NotAKind".to_string()
            }
        );
    }

    #[test]
    fn argument_contracts_are_checked() {
        assert!(matches!(
            create("roList", &[Value::Integer(1)]),
            Err(CreationFailure::Arity { found: 1, .. })
        ));
        assert!(matches!(
            create("roRegex", &[Value::from("a"), Value::Integer(1)]),
            Err(CreationFailure::ArgumentType { position: 2, found: "Integer", .. })
        ));
        assert!(matches!(
            create("roRegex", &[Value::from("(open"), Value::from("")]),
            Err(CreationFailure::Invalid { .. })
        ));
        assert!(matches!(
            create("roString", &[]),
            Ok(Component::String(string)) if string.as_str().is_empty()
        ));
        assert!(create("roArray", &[Value::Integer(10), Value::Boolean(true)]).is_ok());
    }

    #[test]
    fn node_kind_comes_from_the_type_argument() {
        let Ok(Component::Node(node)) = create("roSGNode", &[Value::from("Label")]) else {
            panic!("expected roSGNode");
        };
        assert_eq!(node.subtype(), "Label");
        assert!(matches!(
            create("roSGNode", &[Value::from("Unheard")]),
            Err(CreationFailure::Invalid { .. })
        ));
    }

    #[test]
    fn node_creation_reads_the_catalog_at_call_time() {
        let registry = ComponentRegistry::with_builtins();
        let catalog = NodeKindCatalog::new();
        let cx = CreationContext { catalog: &catalog };
        assert!(registry.create("roSGNode", &[Value::from("Tile")], &cx).is_err());

        catalog.declare(NodeKindDefinition {
            name: "Tile".to_string(),
            extends: Some("Poster".to_string()),
            fields: Vec::new(),
        });
        let Ok(Component::Node(tile)) = registry.create("roSGNode", &[Value::from("Tile")], &cx)
        else {
            panic!("expected roSGNode");
        };
        assert!(tile.is_subtype("Poster"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn register_replaces_and_extends() {
        let mut registry = ComponentRegistry::with_builtins();
        let before = registry.kind_names().len();
        let replaced = registry.register(
            "roDeviceInfo",
            Constructor::Custom(Arc::new(|args: &[Value], _: &CreationContext<'_>| {
                check_arity("roDeviceInfo", args, 0, 0)?;
                Ok(Component::Object(
                    ExtensionObject::new("roDeviceInfo").with_field("model", Value::from("4200X")),
                ))
            })),
        );
        assert!(replaced.is_none());
        assert_eq!(registry.kind_names().len(), before + 1);

        let catalog = NodeKindCatalog::new();
        let cx = CreationContext { catalog: &catalog };
        let Ok(Component::Object(device)) = registry.create("RODEVICEINFO", &[], &cx) else {
            panic!("expected extension object");
        };
        assert_eq!(device.kind, "roDeviceInfo");

        registry.register(
            "roPath",
            Constructor::Text(|path| match path.split_once(':') {
                Some((volume, _)) if !volume.is_empty() => Ok(Component::String(RoString::new(path))),
                _ => Err(format!("'{path}' has no volume")),
            }),
        );
        assert!(registry.create("roPath", &[Value::from("pkg:/manifest")], &cx).is_ok());
        assert!(matches!(
            registry.create("roPath", &[Value::from("manifest")], &cx),
            Err(CreationFailure::Invalid { .. })
        ));

        let replaced = registry.register("ROLIST", Constructor::Plain(|| Component::Array(RoArray::new())));
        assert_eq!(replaced.map(|descriptor| descriptor.kind_name), Some("roList".to_string()));
        assert!(matches!(registry.create("roList", &[], &cx), Ok(Component::Array(_))));
    }
}
