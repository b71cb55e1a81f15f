use super::{Span, Spanned, Token};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestValue {
    Bool(bool),
    Text(String),
}

impl fmt::Display for ManifestValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Channel manifest: `key=value` lines, `true`/`false` values become
/// booleans. Conditional compilation reads the `bs_const` entry
/// (`name=true;other=false`) and plain boolean entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestValue>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut manifest = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            manifest.set(key.trim(), value.trim());
        }
        manifest
    }

    pub fn set(&mut self, key: &str, value: &str) {
        let value = match value.to_ascii_lowercase().as_str() {
            "true" => ManifestValue::Bool(true),
            "false" => ManifestValue::Bool(false),
            _ => ManifestValue::Text(value.to_string()),
        };
        self.entries.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ManifestValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a conditional-compilation name: `bs_const` entries first,
    /// then top-level boolean entries. Names are case-insensitive.
    pub fn flag(&self, name: &str) -> Option<bool> {
        if let Some(ManifestValue::Text(constants)) = self.entries.get("bs_const") {
            let found = constants.split(';').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                if !key.trim().eq_ignore_ascii_case(name) {
                    return None;
                }
                match value.trim().to_ascii_lowercase().as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                }
            });
            if found.is_some() {
                return found;
            }
        }
        self.entries.iter().find_map(|(key, value)| match value {
            ManifestValue::Bool(flag) if key.eq_ignore_ascii_case(name) => Some(*flag),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorError {
    pub span: Span,
    pub message: String,
}

impl fmt::Display for PreprocessorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

struct Conditional {
    span: Span,
    enclosing_active: bool,
    branch_taken: bool,
    active: bool,
    seen_else: bool,
}

/// Evaluates `#const`/`#if` directives against the manifest and returns the
/// tokens of the active branches. Line breaks of removed lines are kept.
pub fn preprocess(
    tokens: Vec<Spanned<Token>>,
    manifest: &Manifest,
) -> Result<Vec<Spanned<Token>>, Vec<PreprocessorError>> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut errors = Vec::new();
    let mut constants = HashMap::<String, bool>::new();
    let mut stack = Vec::<Conditional>::new();

    for line in split_lines(tokens) {
        let active = stack.last().is_none_or(|conditional| conditional.active);
        let Some(Spanned {
            node: Token::Directive(directive),
            span,
        }) = line.first().cloned()
        else {
            if active {
                output.extend(line);
            } else {
                output.extend(line.into_iter().filter(|token| token.node == Token::Newline));
            }
            continue;
        };
        let arguments: Vec<&Spanned<Token>> = line[1..]
            .iter()
            .filter(|token| token.node != Token::Newline)
            .collect();
        let mut fail = |message: String| errors.push(PreprocessorError { span, message });

        match directive.as_str() {
            "const" if !active => {}
            "const" => {
                if let [name, equal, value] = arguments.as_slice()
                    && let Token::Identifier(name) = &name.node
                    && equal.node == Token::Equal
                {
                    match condition_value(&[*value], &constants, manifest) {
                        Ok(value) => {
                            constants.insert(name.to_ascii_lowercase(), value);
                        }
                        Err(message) => fail(message),
                    }
                } else {
                    fail("Malformed #const, expected `#const name = value`".to_string());
                }
            }
            "if" => {
                let value = if active {
                    match condition_value(&arguments, &constants, manifest) {
                        Ok(value) => value,
                        Err(message) => {
                            fail(message);
                            false
                        }
                    }
                } else {
                    false
                };
                stack.push(Conditional {
                    span,
                    enclosing_active: active,
                    branch_taken: value,
                    active: active && value,
                    seen_else: false,
                });
            }
            "elseif" | "else" => {
                let (is_else_if, condition): (bool, &[&Spanned<Token>]) = match directive.as_str() {
                    "elseif" => (true, &arguments[..]),
                    _ => match arguments.split_first() {
                        Some((first, rest)) if first.node == Token::If => (true, rest),
                        _ => (false, &[]),
                    },
                };
                let Some(conditional) = stack.last_mut() else {
                    fail(format!("#{directive} without matching #if"));
                    continue;
                };
                if conditional.seen_else {
                    fail(format!("#{directive} after #else"));
                    continue;
                }
                if is_else_if {
                    let value = if conditional.enclosing_active && !conditional.branch_taken {
                        match condition_value(condition, &constants, manifest) {
                            Ok(value) => value,
                            Err(message) => {
                                fail(message);
                                false
                            }
                        }
                    } else {
                        false
                    };
                    conditional.active = conditional.enclosing_active && value;
                    conditional.branch_taken |= value;
                } else {
                    conditional.seen_else = true;
                    conditional.active = conditional.enclosing_active && !conditional.branch_taken;
                    conditional.branch_taken = true;
                }
            }
            "endif" | "end" => {
                let well_formed = match directive.as_str() {
                    "endif" => arguments.is_empty(),
                    _ => matches!(arguments.as_slice(), [token] if token.node == Token::If),
                };
                if !well_formed {
                    fail(format!("Malformed #{directive}, expected `#end if`"));
                } else if stack.pop().is_none() {
                    fail("#end if without matching #if".to_string());
                }
            }
            "error" => {
                if active {
                    let message = arguments
                        .iter()
                        .map(|token| token.node.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    fail(format!("#error {message}"));
                }
            }
            _ if !active => {}
            other => fail(format!("Unknown directive #{other}")),
        }
        output.extend(line.into_iter().filter(|token| token.node == Token::Newline));
    }

    for conditional in stack {
        errors.push(PreprocessorError {
            span: conditional.span,
            message: "Unterminated #if".to_string(),
        });
    }

    if errors.is_empty() { Ok(output) } else { Err(errors) }
}

fn split_lines(tokens: Vec<Spanned<Token>>) -> Vec<Vec<Spanned<Token>>> {
    let mut lines = vec![Vec::new()];
    for token in tokens {
        let is_newline = token.node == Token::Newline;
        if let Some(line) = lines.last_mut() {
            line.push(token);
        }
        if is_newline {
            lines.push(Vec::new());
        }
    }
    lines.retain(|line| !line.is_empty());
    lines
}

fn condition_value(
    tokens: &[&Spanned<Token>],
    constants: &HashMap<String, bool>,
    manifest: &Manifest,
) -> Result<bool, String> {
    match tokens {
        [not, rest @ ..] if not.node == Token::Not && !rest.is_empty() => {
            condition_value(rest, constants, manifest).map(|value| !value)
        }
        [single] => match &single.node {
            Token::True => Ok(true),
            Token::False => Ok(false),
            Token::Identifier(name) => constants
                .get(&name.to_ascii_lowercase())
                .copied()
                .or_else(|| manifest.flag(name))
                .ok_or_else(|| format!("Unknown conditional compilation constant '{name}'")),
            other => Err(format!("Unexpected '{other}' in conditional compilation")),
        },
        [] => Err("Missing conditional compilation expression".to_string()),
        _ => Err("Conditional compilation expects a single name or boolean".to_string()),
    }
}
