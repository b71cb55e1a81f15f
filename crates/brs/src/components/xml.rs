use super::collections::RoAssociativeArray;
use super::{Arguments, Component, MethodContext, MethodError};
use crate::runtime::{ComponentRef, Heap, Value};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Deepest element nesting `GenXML` will write.
const MAX_XML_DEPTH: usize = 256;

/// Why a document could not be written.
enum WriteError {
    Cycle,
    TooDeep,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum XmlBody {
    #[default]
    Empty,
    Text(String),
    Elements(Vec<ComponentRef>),
}

/// `roXMLElement`, built up programmatically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoXmlElement {
    name: String,
    attributes: IndexMap<String, String>,
    body: XmlBody,
}

impl RoXmlElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn body(&self) -> &XmlBody {
        &self.body
    }

    pub fn children(&self) -> &[ComponentRef] {
        match &self.body {
            XmlBody::Elements(children) => children,
            _ => &[],
        }
    }

    pub(super) fn references(&self) -> Vec<ComponentRef> {
        self.children().to_vec()
    }

    fn push_child(&mut self, child: ComponentRef) {
        match &mut self.body {
            XmlBody::Elements(children) => children.push(child),
            body => *body = XmlBody::Elements(vec![child]),
        }
    }

    pub(super) fn call(
        &mut self,
        args: Arguments<'_>,
        cx: &mut MethodContext<'_>,
    ) -> Result<Value, MethodError> {
        match args.method() {
            "getname" => {
                args.expect(0)?;
                Ok(Value::String(self.name.clone()))
            }
            "setname" => {
                args.expect(1)?;
                self.name = args.string(0)?.to_string();
                Ok(Value::Invalid)
            }
            "addattribute" => {
                args.expect(2)?;
                self.attributes
                    .insert(args.string(0)?.to_string(), args.string(1)?.to_string());
                Ok(Value::Invalid)
            }
            "hasattribute" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.attributes.contains_key(args.string(0)?)))
            }
            "getattributes" => {
                args.expect(0)?;
                let mut attributes = RoAssociativeArray::new();
                for (name, value) in &self.attributes {
                    attributes.insert(name, Value::String(value.clone()));
                }
                Ok(Value::Object(
                    cx.heap.alloc(Component::AssociativeArray(attributes)),
                ))
            }
            "setbody" => {
                args.expect(1)?;
                self.body = match args.value(0)? {
                    Value::String(text) => XmlBody::Text(text),
                    Value::Invalid => XmlBody::Empty,
                    Value::Object(list) => match cx.heap.get(list) {
                        Some(Component::XmlList(list)) => XmlBody::Elements(list.elements.clone()),
                        _ => return Err(args.failed("body must be a String or roXMLList")),
                    },
                    _ => return Err(args.failed("body must be a String or roXMLList")),
                };
                Ok(Value::Invalid)
            }
            "getbody" => {
                args.expect(0)?;
                Ok(match &self.body {
                    XmlBody::Empty => Value::Invalid,
                    XmlBody::Text(text) => Value::String(text.clone()),
                    XmlBody::Elements(children) => Value::Object(cx.heap.alloc(
                        Component::XmlList(RoXmlList::from(children.clone())),
                    )),
                })
            }
            "gettext" => {
                args.expect(0)?;
                Ok(Value::String(match &self.body {
                    XmlBody::Text(text) => text.clone(),
                    _ => String::new(),
                }))
            }
            "addelement" | "addelementwithbody" => {
                let with_body = args.method() == "addelementwithbody";
                args.expect(if with_body { 2 } else { 1 })?;
                let mut child = RoXmlElement::named(args.string(0)?);
                if with_body {
                    child.body = XmlBody::Text(args.string(1)?.to_string());
                }
                let child = cx.heap.alloc(Component::XmlElement(child));
                self.push_child(child);
                Ok(Value::Object(child))
            }
            "getchildelements" => {
                args.expect(0)?;
                match &self.body {
                    XmlBody::Elements(children) => Ok(Value::Object(cx.heap.alloc(
                        Component::XmlList(RoXmlList::from(children.clone())),
                    ))),
                    _ => Ok(Value::Invalid),
                }
            }
            "getnamedelements" | "getnamedelementsci" => {
                args.expect(1)?;
                let name = args.string(0)?;
                let ignore_case = args.method() == "getnamedelementsci";
                let matching = named_elements(cx.heap, self.children(), name, ignore_case);
                Ok(Value::Object(
                    cx.heap.alloc(Component::XmlList(RoXmlList::from(matching))),
                ))
            }
            "genxml" => {
                args.expect_range(0, 1)?;
                let header = if args.is_empty() {
                    true
                } else {
                    args.boolean(0)?
                };
                let mut output = String::new();
                if header {
                    output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
                }
                let mut open = HashSet::from([cx.this]);
                match self.write_xml(cx.heap, &mut open, &mut output) {
                    Ok(()) => Ok(Value::String(output)),
                    Err(WriteError::Cycle) => Err(args.failed("element contains itself")),
                    Err(WriteError::TooDeep) => Err(args.failed(format!(
                        "elements are nested deeper than {MAX_XML_DEPTH}"
                    ))),
                }
            }
            _ => Err(args.unknown("roXMLElement")),
        }
    }

    /// `open` holds the elements currently being written, outermost first.
    fn write_xml(
        &self,
        heap: &Heap,
        open: &mut HashSet<ComponentRef>,
        output: &mut String,
    ) -> Result<(), WriteError> {
        if open.len() > MAX_XML_DEPTH {
            return Err(WriteError::TooDeep);
        }
        output.push('<');
        output.push_str(&self.name);
        for (name, value) in &self.attributes {
            output.push_str(&format!(" {name}=\"{}\"", escape(value)));
        }
        match &self.body {
            XmlBody::Empty => output.push_str("/>"),
            XmlBody::Text(text) => {
                output.push('>');
                output.push_str(&escape(text));
                output.push_str(&format!("</{}>", self.name));
            }
            XmlBody::Elements(children) => {
                output.push('>');
                for &child in children {
                    if !open.insert(child) {
                        return Err(WriteError::Cycle);
                    }
                    if let Some(Component::XmlElement(element)) = heap.get(child) {
                        element.write_xml(heap, open, output)?;
                    }
                    open.remove(&child);
                }
                output.push_str(&format!("</{}>", self.name));
            }
        }
        Ok(())
    }

    pub(super) fn snapshot(
        &self,
        mut nested: impl FnMut(&Value) -> serde_json::Value,
    ) -> serde_json::Value {
        let body = match &self.body {
            XmlBody::Empty => serde_json::Value::Null,
            XmlBody::Text(text) => serde_json::Value::String(text.clone()),
            XmlBody::Elements(children) => serde_json::Value::Array(
                children
                    .iter()
                    .map(|child| nested(&Value::Object(*child)))
                    .collect(),
            ),
        };
        serde_json::json!({
            "name": self.name,
            "attributes": self.attributes,
            "body": body,
        })
    }
}

fn named_elements(
    heap: &Heap,
    elements: &[ComponentRef],
    name: &str,
    ignore_case: bool,
) -> Vec<ComponentRef> {
    elements
        .iter()
        .copied()
        .filter(|element| match heap.get(*element) {
            Some(Component::XmlElement(element)) if ignore_case => {
                element.name.eq_ignore_ascii_case(name)
            }
            Some(Component::XmlElement(element)) => element.name == name,
            _ => false,
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `roXMLList`: an ordered list of element handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoXmlList {
    elements: Vec<ComponentRef>,
}

impl From<Vec<ComponentRef>> for RoXmlList {
    fn from(elements: Vec<ComponentRef>) -> Self {
        Self { elements }
    }
}

impl RoXmlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[ComponentRef] {
        &self.elements
    }

    pub(super) fn call(
        &mut self,
        args: Arguments<'_>,
        cx: &mut MethodContext<'_>,
    ) -> Result<Value, MethodError> {
        let element_or_invalid =
            |element: Option<&ComponentRef>| element.copied().map_or(Value::Invalid, Value::Object);
        match args.method() {
            "count" => {
                args.expect(0)?;
                Ok(Value::Integer(self.elements.len() as i64))
            }
            "isempty" => {
                args.expect(0)?;
                Ok(Value::Boolean(self.elements.is_empty()))
            }
            "push" | "addtail" => {
                args.expect(1)?;
                let element = args.object(0)?;
                if !matches!(cx.heap.get(element), Some(Component::XmlElement(_))) {
                    return Err(args.failed("only roXMLElement can be added"));
                }
                self.elements.push(element);
                Ok(Value::Invalid)
            }
            "gethead" => {
                args.expect(0)?;
                Ok(element_or_invalid(self.elements.first()))
            }
            "gettail" => {
                args.expect(0)?;
                Ok(element_or_invalid(self.elements.last()))
            }
            "getentry" => {
                args.expect(1)?;
                let index = usize::try_from(args.integer(0)?).ok();
                Ok(element_or_invalid(
                    index.and_then(|index| self.elements.get(index)),
                ))
            }
            "getnamedelements" | "getnamedelementsci" => {
                args.expect(1)?;
                let ignore_case = args.method() == "getnamedelementsci";
                let children: Vec<ComponentRef> = self
                    .elements
                    .iter()
                    .filter_map(|element| match cx.heap.get(*element) {
                        Some(Component::XmlElement(element)) => Some(element.children().to_vec()),
                        _ => None,
                    })
                    .flatten()
                    .collect();
                let matching = named_elements(cx.heap, &children, args.string(0)?, ignore_case);
                Ok(Value::Object(
                    cx.heap.alloc(Component::XmlList(RoXmlList::from(matching))),
                ))
            }
            _ => Err(args.unknown("roXMLList")),
        }
    }
}
