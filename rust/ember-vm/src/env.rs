//! Flat global variable table.

use crate::values::Value;
use crate::vm::VmError;

/// Maximum number of distinct variable bindings.
pub const MAX_VARS: usize = 100;

/// Dictionary globals that compiler-generated programs read before any
/// explicit assignment. Each is bound to a fresh empty dict on first read.
pub const AUTO_DICT_GLOBALS: &[&str] = &["D"];

/// Global name→value bindings with linear lookup.
///
/// The namespace is flat: there are no scopes or frames, and a `STORE`
/// either rebinds an existing name or appends a new binding.
#[derive(Debug, Default)]
pub struct Globals {
    bindings: Vec<(String, Value)>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an absent name as `Null` instead of failing, except for the
    /// auto-vivified dict globals, which are created and persisted here.
    pub fn get(&mut self, name: &str) -> Result<Value, VmError> {
        if let Some((_, v)) = self.bindings.iter().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        if AUTO_DICT_GLOBALS.contains(&name) {
            let dict = Value::new_dict();
            self.bind(name.to_string(), dict.clone())?;
            return Ok(dict);
        }
        Ok(Value::Null)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), VmError> {
        if let Some(slot) = self.bindings.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
            return Ok(());
        }
        self.bind(name.to_string(), value)
    }

    fn bind(&mut self, name: String, value: Value) -> Result<(), VmError> {
        if self.bindings.len() >= MAX_VARS {
            return Err(VmError::VariableTableFull);
        }
        self.bindings.push((name, value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
