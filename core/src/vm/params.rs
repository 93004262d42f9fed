//! file: core/src/vm/params.rs
//! description: the stack-frame view handed to native callbacks.
//!
//! Slot 0 is the result slot; arguments are 1-based, matching the calling
//! convention of the interpreter. Natives report failure or request
//! suspension through this view instead of returning values.

use std::any::Any;
use std::net::IpAddr;

use crate::types::Cidr;
use crate::vm::value::Value;

pub struct Params<'a> {
    /// `argv[0]` is the result slot, `argv[1..]` the call arguments.
    argv: Vec<Value>,
    groups: &'a [String],
    context: &'a mut dyn Any,
    pub(crate) suspend: Option<u64>,
    pub(crate) error: Option<String>,
}

impl<'a> Params<'a> {
    pub(crate) fn new(args: Vec<Value>, groups: &'a [String], context: &'a mut dyn Any) -> Self {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(Value::Void);
        argv.extend(args);
        Params { argv, groups, context, suspend: None, error: None }
    }

    pub fn arg_count(&self) -> usize {
        self.argv.len() - 1
    }

    pub fn value(&self, index: usize) -> &Value {
        self.argv.get(index).unwrap_or(&Value::Void)
    }

    pub fn get_bool(&self, index: usize) -> bool {
        self.value(index).as_bool()
    }

    pub fn get_number(&self, index: usize) -> i64 {
        self.value(index).as_number()
    }

    pub fn get_string(&self, index: usize) -> String {
        match self.value(index) {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn get_ip(&self, index: usize) -> Option<IpAddr> {
        match self.value(index) {
            Value::IP(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn get_cidr(&self, index: usize) -> Option<Cidr> {
        match self.value(index) {
            Value::Cidr(c) => Some(*c),
            _ => None,
        }
    }

    pub fn set_result(&mut self, value: impl Into<Value>) {
        self.argv[0] = value.into();
    }

    /// The capture group of the most recent regex match; group 0 is the
    /// whole match. Empty when the last match failed.
    pub fn regex_group(&self, index: usize) -> &str {
        self.groups.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    /// Asks the runner to suspend after this native returns; the host
    /// resumes it after roughly `seconds` seconds.
    pub fn suspend(&mut self, seconds: u64) {
        self.suspend = Some(seconds);
    }

    /// Marks the invocation as failed; the runner halts with an error.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.downcast_ref::<T>()
    }

    pub fn context_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.context.downcast_mut::<T>()
    }

    pub(crate) fn finish(self) -> (Value, Option<u64>, Option<String>) {
        let mut argv = self.argv;
        let result = argv.swap_remove(0);
        (result, self.suspend, self.error)
    }
}
