use super::{Arguments, MethodError};
use crate::runtime::Value;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RoTimespan {
    marked: Instant,
}

impl Default for RoTimespan {
    fn default() -> Self {
        Self::new()
    }
}

impl RoTimespan {
    /// Starts marked at the time of creation.
    pub fn new() -> Self {
        Self {
            marked: Instant::now(),
        }
    }

    pub fn mark(&mut self) {
        self.marked = Instant::now();
    }

    pub fn total_milliseconds(&self) -> i64 {
        self.marked.elapsed().as_millis() as i64
    }

    pub fn total_seconds(&self) -> i64 {
        self.marked.elapsed().as_secs() as i64
    }

    pub(super) fn call(&mut self, args: Arguments<'_>) -> Result<Value, MethodError> {
        match args.method() {
            "mark" => {
                args.expect(0)?;
                self.mark();
                Ok(Value::Invalid)
            }
            "totalmilliseconds" => {
                args.expect(0)?;
                Ok(Value::Integer(self.total_milliseconds()))
            }
            "totalseconds" => {
                args.expect(0)?;
                Ok(Value::Integer(self.total_seconds()))
            }
            _ => Err(args.unknown("roTimespan")),
        }
    }
}
