use super::collections::RoArray;
use super::{Arguments, Component, MethodContext, MethodError};
use crate::runtime::Value;
use regex::{Regex, RegexBuilder};

/// `roRegex`: a compiled pattern plus the flag string it was created with.
#[derive(Debug, Clone)]
pub struct RoRegex {
    pattern: String,
    flags: String,
    regex: Regex,
}

impl RoRegex {
    /// Flags: `i` case-insensitive, `m` multi-line, `s` dot matches newline,
    /// `x` ignore whitespace.
    pub fn new(pattern: &str, flags: &str) -> Result<Self, String> {
        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => return Err(format!("unsupported flag '{other}'")),
            };
        }
        let regex = builder.build().map_err(|error| error.to_string())?;
        Ok(Self {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Whole match followed by every capture group; unmatched groups are
    /// empty strings. Empty when there is no match.
    pub fn captures(&self, text: &str) -> Vec<String> {
        self.regex
            .captures(text)
            .map(|captures| {
                captures
                    .iter()
                    .map(|group| group.map(|group| group.as_str().to_string()).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn replace(&self, text: &str, replacement: &str, all: bool) -> String {
        let template = replacement_template(replacement);
        if all {
            self.regex.replace_all(text, template.as_str()).into_owned()
        } else {
            self.regex.replace(text, template.as_str()).into_owned()
        }
    }

    pub(super) fn call(
        &mut self,
        args: Arguments<'_>,
        cx: &mut MethodContext<'_>,
    ) -> Result<Value, MethodError> {
        match args.method() {
            "ismatch" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.is_match(args.string(0)?)))
            }
            "match" => {
                args.expect(1)?;
                Ok(string_array(cx, self.captures(args.string(0)?)))
            }
            "matchall" => {
                args.expect(1)?;
                let text = args.string(0)?;
                let matches: Vec<Vec<String>> = self
                    .regex
                    .captures_iter(text)
                    .map(|captures| {
                        captures
                            .iter()
                            .map(|group| {
                                group.map(|group| group.as_str().to_string()).unwrap_or_default()
                            })
                            .collect()
                    })
                    .collect();
                let matches = matches
                    .into_iter()
                    .map(|groups| string_array(cx, groups))
                    .collect::<Vec<_>>();
                Ok(Value::Object(
                    cx.heap.alloc(Component::Array(RoArray::from(matches))),
                ))
            }
            "replace" | "replaceall" => {
                args.expect(2)?;
                let all = args.method() == "replaceall";
                Ok(Value::String(self.replace(
                    args.string(0)?,
                    args.string(1)?,
                    all,
                )))
            }
            "split" => {
                args.expect(1)?;
                let parts = self
                    .regex
                    .split(args.string(0)?)
                    .map(str::to_string)
                    .collect();
                Ok(string_array(cx, parts))
            }
            _ => Err(args.unknown("roRegex")),
        }
    }
}

fn string_array(cx: &mut MethodContext<'_>, items: Vec<String>) -> Value {
    let items = items.into_iter().map(Value::String).collect::<Vec<_>>();
    Value::Object(cx.heap.alloc(Component::Array(RoArray::from(items))))
}

/// Replacement strings refer to groups as `\1`; the regex crate expects
/// `${1}` and treats a bare `$` specially.
fn replacement_template(replacement: &str) -> String {
    let mut template = String::with_capacity(replacement.len());
    let mut characters = replacement.chars().peekable();
    while let Some(character) = characters.next() {
        match character {
            '\\' => match characters.next_if(|next| next.is_ascii_digit()) {
                Some(digit) => template.push_str(&format!("${{{digit}}}")),
                None => template.push('\\'),
            },
            '$' => template.push_str("$$"),
            other => template.push(other),
        }
    }
    template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_flag() {
        let regex = RoRegex::new("a.*b", "i").unwrap();
        assert!(regex.is_match("xxAyyB"));
        assert!(!RoRegex::new("a.*b", "").unwrap().is_match("xxAyyB"));
    }

    #[test]
    fn unsupported_flag_and_bad_pattern_fail() {
        assert!(RoRegex::new("a", "q").is_err());
        assert!(RoRegex::new("(unclosed", "").is_err());
    }

    #[test]
    fn captures_include_whole_match_and_groups() {
        let regex = RoRegex::new(r"(\w+)@(\w+)?", "").unwrap();
        assert_eq!(
            regex.captures("mail: user@"),
            vec!["user@".to_string(), "user".to_string(), String::new()]
        );
        assert!(regex.captures("nothing here").is_empty());
    }

    #[test]
    fn replacement_uses_backslash_groups() {
        let regex = RoRegex::new(r"(\d+)-(\d+)", "").unwrap();
        assert_eq!(regex.replace("1-2 3-4", r"\2-\1", false), "2-1 3-4");
        assert_eq!(regex.replace("1-2 3-4", r"\2-\1", true), "2-1 4-3");
        assert_eq!(regex.replace("1-2", "$", true), "$");
    }
}
