use super::{Arguments, MethodError};
use crate::runtime::Value;

/// `roString`: mutable boxed string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoString {
    value: String,
}

impl RoString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    fn char_count(&self) -> i64 {
        self.value.chars().count() as i64
    }

    /// Characters `[start, start + length)`, clamped to the string.
    fn substring(&self, start: i64, length: Option<i64>) -> String {
        let start = start.max(0) as usize;
        let characters = self.value.chars().skip(start);
        match length {
            Some(length) => characters.take(length.max(0) as usize).collect(),
            None => characters.collect(),
        }
    }

    pub(super) fn call(&mut self, args: Arguments<'_>) -> Result<Value, MethodError> {
        match args.method() {
            "getstring" | "tostr" => {
                args.expect(0)?;
                Ok(Value::String(self.value.clone()))
            }
            "setstring" => {
                args.expect(1)?;
                self.value = args.string(0)?.to_string();
                Ok(Value::Invalid)
            }
            "appendstring" => {
                args.expect_range(1, 2)?;
                let suffix = args.string(0)?;
                args.ensure_string_bytes(self.value.len() + suffix.len())?;
                match args.len() {
                    2 => {
                        let length = args.integer(1)?.max(0) as usize;
                        self.value.extend(suffix.chars().take(length));
                    }
                    _ => self.value.push_str(suffix),
                }
                Ok(Value::Invalid)
            }
            "len" => {
                args.expect(0)?;
                Ok(Value::Integer(self.char_count()))
            }
            "left" => {
                args.expect(1)?;
                Ok(Value::String(self.substring(0, Some(args.integer(0)?))))
            }
            "right" => {
                args.expect(1)?;
                let length = args.integer(0)?.max(0);
                let start = (self.char_count() - length).max(0);
                Ok(Value::String(self.substring(start, None)))
            }
            "mid" => {
                args.expect_range(1, 2)?;
                let length = if args.len() == 2 {
                    Some(args.integer(1)?)
                } else {
                    None
                };
                Ok(Value::String(self.substring(args.integer(0)?, length)))
            }
            "instr" => {
                args.expect(1)?;
                let needle = args.string(0)?;
                let position = self
                    .value
                    .find(needle)
                    .map(|byte| self.value[..byte].chars().count() as i64)
                    .unwrap_or(-1);
                Ok(Value::Integer(position))
            }
            "replace" => {
                args.expect(2)?;
                let from = args.string(0)?;
                if from.is_empty() {
                    return Ok(Value::String(self.value.clone()));
                }
                Ok(Value::String(self.value.replace(from, args.string(1)?)))
            }
            "trim" => {
                args.expect(0)?;
                Ok(Value::String(self.value.trim().to_string()))
            }
            "lcase" => {
                args.expect(0)?;
                Ok(Value::String(self.value.to_lowercase()))
            }
            "ucase" => {
                args.expect(0)?;
                Ok(Value::String(self.value.to_uppercase()))
            }
            "startswith" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.value.starts_with(args.string(0)?)))
            }
            "endswith" => {
                args.expect(1)?;
                Ok(Value::Boolean(self.value.ends_with(args.string(0)?)))
            }
            "toint" => {
                args.expect(0)?;
                Ok(Value::Integer(leading_number(&self.value) as i64))
            }
            "tofloat" => {
                args.expect(0)?;
                Ok(Value::Float(leading_number(&self.value)))
            }
            _ => Err(args.unknown("roString")),
        }
    }
}

/// Numeric value of the longest numeric prefix, 0 when there is none.
pub(crate) fn leading_number(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_point = false;
    for (index, character) in text.char_indices() {
        match character {
            '+' | '-' if index == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => break,
        }
        end = index + character.len_utf8();
    }
    if !seen_digit {
        return 0.0;
    }
    text[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(string: &mut RoString, method: &str, values: &[Value]) -> Value {
        string.call(Arguments::new(method, values)).unwrap()
    }

    #[test]
    fn append_and_get() {
        let mut string = RoString::new("Hello");
        call(&mut string, "appendstring", &[Value::from(", world!!"), Value::Integer(7)]);
        assert_eq!(call(&mut string, "getstring", &[]), Value::from("Hello, world"));
        assert_eq!(call(&mut string, "len", &[]), Value::Integer(12));
    }

    #[test]
    fn substrings_count_characters() {
        let mut string = RoString::new("héllo");
        assert_eq!(call(&mut string, "left", &[Value::Integer(2)]), Value::from("hé"));
        assert_eq!(call(&mut string, "right", &[Value::Integer(3)]), Value::from("llo"));
        assert_eq!(
            call(&mut string, "mid", &[Value::Integer(1), Value::Integer(3)]),
            Value::from("éll")
        );
        assert_eq!(call(&mut string, "instr", &[Value::from("l")]), Value::Integer(2));
        assert_eq!(call(&mut string, "instr", &[Value::from("z")]), Value::Integer(-1));
    }

    #[test]
    fn numeric_prefixes() {
        assert_eq!(leading_number("  42abc"), 42.0);
        assert_eq!(leading_number("-3.5"), -3.5);
        assert_eq!(leading_number("7."), 7.0);
        assert_eq!(leading_number("abc"), 0.0);
    }
}
