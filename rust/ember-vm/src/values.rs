//! Tagged value representation for the Ember VM.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Runtime values in the Ember VM.
///
/// `Null`, `Int`, and `Str` copy by value on assignment. `List` and `Dict`
/// are shared mutable handles: cloning the value aliases the same underlying
/// storage, so a mutation through one alias is visible through every other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<DictStorage>>),
}

/// Insertion-ordered string-keyed storage with linear lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictStorage {
    entries: Vec<(String, Value)>,
}

impl DictStorage {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Rebinds an existing key in place, or appends a new entry.
    pub fn insert(&mut self, key: String, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }
}

impl Value {
    pub fn new_list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn new_dict() -> Self {
        Value::Dict(Rc::new(RefCell::new(DictStorage::default())))
    }

    /// Literal decoding for PUSH: an optionally-signed all-digit token is an
    /// integer, anything else is the verbatim string, an absent argument is 0.
    pub fn from_literal(arg: &str) -> Self {
        if arg.is_empty() {
            return Value::Int(0);
        }
        if is_int_literal(arg) {
            if let Ok(n) = arg.parse::<i64>() {
                return Value::Int(n);
            }
        }
        Value::Str(arg.to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Textual form used by PRINT, string concatenation, and dict keys.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(l) => {
                let items: Vec<String> = l.borrow().iter().map(Value::render_quoted).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Dict(d) => {
                let entries: Vec<String> = d
                    .borrow()
                    .entries()
                    .iter()
                    .map(|(k, v)| format!("\"{}\": {}", k, v.render_quoted()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
        }
    }

    /// Display with quotes for strings (used inside containers).
    fn render_quoted(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            _ => self.render(),
        }
    }
}

fn is_int_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Container and cross-type comparisons are always unequal.
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_decoding() {
        assert_eq!(Value::from_literal("42"), Value::Int(42));
        assert_eq!(Value::from_literal("-7"), Value::Int(-7));
        assert_eq!(Value::from_literal("+7"), Value::Int(7));
        assert_eq!(Value::from_literal("hello"), Value::Str("hello".into()));
        assert_eq!(Value::from_literal("4x2"), Value::Str("4x2".into()));
        assert_eq!(Value::from_literal("-"), Value::Str("-".into()));
        assert_eq!(Value::from_literal(""), Value::Int(0));
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Int(-3).render(), "-3");
        assert_eq!(Value::Str("hi".into()).render(), "hi");
        assert_eq!(Value::Null.render(), "null");
        let list = Value::new_list(vec![Value::Int(1), Value::Str("a".into())]);
        assert_eq!(list.render(), "[1, \"a\"]");
    }

    #[test]
    fn test_dict_render_preserves_insertion_order() {
        let dict = Value::new_dict();
        if let Value::Dict(d) = &dict {
            let mut d = d.borrow_mut();
            d.insert("z".into(), Value::Int(1));
            d.insert("a".into(), Value::Int(2));
        }
        assert_eq!(dict.render(), "{\"z\": 1, \"a\": 2}");
    }

    #[test]
    fn test_equality_rules() {
        assert_eq!(Value::Int(5), Value::Int(5));
        assert_ne!(Value::Int(5), Value::Int(6));
        assert_eq!(Value::Str("a".into()), Value::Str("a".into()));
        assert_eq!(Value::Null, Value::Null);
        // Cross-type comparisons never match, even when the text agrees.
        assert_ne!(Value::Int(5), Value::Str("5".into()));
        // Containers compare unequal regardless of contents or identity.
        let list = Value::new_list(vec![]);
        assert_ne!(list.clone(), list);
    }

    #[test]
    fn test_list_clone_aliases_storage() {
        let list = Value::new_list(vec![Value::Int(1)]);
        let alias = list.clone();
        if let Value::List(l) = &list {
            l.borrow_mut().push(Value::Int(2));
        }
        if let Value::List(l) = &alias {
            assert_eq!(l.borrow().len(), 2);
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn test_dict_insert_rebinds_in_place() {
        let mut storage = DictStorage::default();
        storage.insert("k".into(), Value::Int(1));
        storage.insert("k".into(), Value::Int(2));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get("k"), Some(&Value::Int(2)));
        assert_eq!(storage.get("missing"), None);
    }
}
