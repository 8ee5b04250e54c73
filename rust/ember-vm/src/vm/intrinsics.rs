//! Built-in method dispatch for CALL instructions.
//!
//! Calling convention: arguments are pushed left-to-right with the receiver
//! pushed last, so the first pop always yields the receiver and later pops
//! yield arguments in reverse push order. Every handler pushes exactly one
//! result (`Null` for purely side-effecting calls).

use super::{Vm, VmError};
use crate::values::Value;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::rc::Rc;

/// Descriptor for one built-in: how many arguments it consumes from the
/// stack beyond the receiver. `CALL name/<n>` pins the count for the
/// variable-arity methods; a bare `CALL name` uses the range minimum.
#[derive(Debug, Clone)]
struct Builtin {
    args: RangeInclusive<usize>,
}

static BUILTINS: Lazy<BTreeMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut table = BTreeMap::new();
    table.insert("splitlines", Builtin { args: 0..=0 });
    table.insert("strip", Builtin { args: 0..=1 });
    table.insert("split", Builtin { args: 0..=1 });
    table.insert("join", Builtin { args: 1..=1 });
    table.insert("startswith", Builtin { args: 1..=1 });
    table.insert("append", Builtin { args: 1..=1 });
    table.insert("format", Builtin { args: 1..=1 });
    table.insert("len", Builtin { args: 0..=0 });
    table.insert("str", Builtin { args: 0..=0 });
    table.insert("chr", Builtin { args: 0..=0 });
    // The path is the receiver: it is the last (only) value pushed.
    table.insert("open", Builtin { args: 0..=0 });
    table.insert("read", Builtin { args: 0..=0 });
    table
});

impl Vm {
    /// CALL entry point. `raw` is the instruction argument: a method name,
    /// optionally carrying an `/<n>` argument-count suffix.
    pub(crate) fn call_builtin(&mut self, raw: &str) -> Result<(), VmError> {
        let (name, explicit) = parse_call(raw)?;
        let builtin = BUILTINS
            .get(name)
            .ok_or_else(|| VmError::UnknownMethod(name.to_string()))?;
        let nargs = explicit.unwrap_or(*builtin.args.start());
        if !builtin.args.contains(&nargs) {
            return Err(VmError::ArityMismatch {
                method: name.to_string(),
                expected: format_arity(&builtin.args),
                got: nargs,
            });
        }
        // Check the receiver and every argument are present before any pop,
        // so a short stack cannot be misread as wrong values.
        if self.stack.len() < nargs + 1 {
            return Err(VmError::StackUnderflow);
        }
        let receiver = self.stack.pop()?;
        let mut args = Vec::with_capacity(nargs);
        for _ in 0..nargs {
            args.push(self.stack.pop()?);
        }
        let result = dispatch(name, receiver, &args)?;
        self.stack.push(result)
    }
}

fn parse_call(raw: &str) -> Result<(&str, Option<usize>), VmError> {
    match raw.split_once('/') {
        Some((name, count)) => {
            let count = count
                .parse::<usize>()
                .map_err(|_| VmError::MalformedCall(raw.to_string()))?;
            Ok((name, Some(count)))
        }
        None => Ok((raw, None)),
    }
}

fn format_arity(range: &RangeInclusive<usize>) -> String {
    if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{}..={}", range.start(), range.end())
    }
}

fn dispatch(name: &str, receiver: Value, args: &[Value]) -> Result<Value, VmError> {
    match name {
        "splitlines" => {
            let s = require_str(name, &receiver)?;
            Ok(str_list(s.split('\n')))
        }
        "strip" => {
            let s = require_str(name, &receiver)?;
            match args.first() {
                None => Ok(Value::Str(
                    s.trim_matches(|c: char| c.is_ascii_whitespace()).to_string(),
                )),
                // Only the first character of the argument is honored, and
                // at most one occurrence is removed from each end.
                Some(chars) => {
                    let chars = require_str(name, chars)?;
                    let mut out = s;
                    if let Some(c) = chars.chars().next() {
                        out = out.strip_prefix(c).unwrap_or(out);
                        out = out.strip_suffix(c).unwrap_or(out);
                    }
                    Ok(Value::Str(out.to_string()))
                }
            }
        }
        "split" => {
            let s = require_str(name, &receiver)?;
            let sep = match args.first() {
                Some(sep) => require_str(name, sep)?,
                None => " ",
            };
            Ok(str_list(s.split(sep)))
        }
        "join" => {
            let list = require_list(name, &receiver)?;
            let sep = require_str(name, &args[0])?;
            let joined = list
                .borrow()
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(sep);
            Ok(Value::Str(joined))
        }
        "startswith" => {
            let s = require_str(name, &receiver)?;
            let prefix = require_str(name, &args[0])?;
            Ok(Value::Int(s.starts_with(prefix) as i64))
        }
        "append" => {
            let list = require_list(name, &receiver)?;
            // Mutates the shared handle: visible through every alias.
            list.borrow_mut().push(args[0].clone());
            Ok(Value::Null)
        }
        "format" => {
            let template = require_str(name, &receiver)?;
            // Only the first placeholder is substituted; a template without
            // one passes through unchanged.
            Ok(Value::Str(template.replacen("{}", &args[0].render(), 1)))
        }
        "len" => Ok(match &receiver {
            Value::List(l) => Value::Int(l.borrow().len() as i64),
            _ => Value::Int(0),
        }),
        "str" => Ok(match &receiver {
            Value::Int(n) => Value::Str(n.to_string()),
            other => other.clone(),
        }),
        "chr" => {
            let code = require_int(name, &receiver)?;
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    VmError::TypeError(format!("{} is not a valid character code", code))
                })?;
            Ok(Value::Str(c.to_string()))
        }
        "open" => {
            let path = require_str(name, &receiver)?;
            // Eager whole-file read; an unreadable path yields an empty
            // string rather than failing.
            Ok(Value::Str(std::fs::read_to_string(path).unwrap_or_default()))
        }
        // Retained for IR compatibility: the content was already produced
        // by `open`, so this passes the receiver through.
        "read" => Ok(receiver),
        other => Err(VmError::UnknownMethod(other.to_string())),
    }
}

/// Collects tokens into a list of strings, collapsing delimiters: empty
/// tokens from leading, trailing, or consecutive separators are dropped.
fn str_list<'a>(tokens: impl Iterator<Item = &'a str>) -> Value {
    Value::new_list(
        tokens
            .filter(|t| !t.is_empty())
            .map(|t| Value::Str(t.to_string()))
            .collect(),
    )
}

fn require_str<'a>(method: &str, value: &'a Value) -> Result<&'a str, VmError> {
    match value {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(VmError::TypeError(format!(
            "{} expects a string, got {}",
            method,
            other.type_name()
        ))),
    }
}

fn require_list(method: &str, value: &Value) -> Result<Rc<RefCell<Vec<Value>>>, VmError> {
    match value {
        Value::List(l) => Ok(Rc::clone(l)),
        other => Err(VmError::TypeError(format!(
            "{} expects a list, got {}",
            method,
            other.type_name()
        ))),
    }
}

fn require_int(method: &str, value: &Value) -> Result<i64, VmError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(VmError::TypeError(format!(
            "{} expects an int, got {}",
            method,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::Str(text.into())
    }

    fn list_contents(value: &Value) -> Vec<String> {
        match value {
            Value::List(l) => l.borrow().iter().map(Value::render).collect(),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_splitlines_collapses_blank_lines() {
        let result = dispatch("splitlines", s("a\n\nb\nc\n"), &[]).unwrap();
        assert_eq!(list_contents(&result), ["a", "b", "c"]);
    }

    #[test]
    fn test_strip_whitespace() {
        let result = dispatch("strip", s("  padded\t "), &[]).unwrap();
        assert_eq!(result, s("padded"));
    }

    #[test]
    fn test_strip_single_character_once_per_end() {
        // Only one occurrence is removed from each end, and only the first
        // character of the argument counts.
        let result = dispatch("strip", s("xxhixx"), &[s("xy")]).unwrap();
        assert_eq!(result, s("xhix"));
        let result = dispatch("strip", s("hi"), &[s("x")]).unwrap();
        assert_eq!(result, s("hi"));
    }

    #[test]
    fn test_split_default_separator() {
        let result = dispatch("split", s("a b  c"), &[]).unwrap();
        assert_eq!(list_contents(&result), ["a", "b", "c"]);
    }

    #[test]
    fn test_split_custom_separator() {
        let result = dispatch("split", s(",a,,b,"), &[s(",")]).unwrap();
        assert_eq!(list_contents(&result), ["a", "b"]);
    }

    #[test]
    fn test_join() {
        let list = Value::new_list(vec![s("a"), s("b"), Value::Int(3)]);
        let result = dispatch("join", list, &[s("-")]).unwrap();
        assert_eq!(result, s("a-b-3"));
    }

    #[test]
    fn test_startswith() {
        assert_eq!(
            dispatch("startswith", s("prefix!"), &[s("pre")]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            dispatch("startswith", s("prefix!"), &[s("post")]).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_append_mutates_shared_handle() {
        let list = Value::new_list(vec![Value::Int(1)]);
        let alias = list.clone();
        let result = dispatch("append", list, &[Value::Int(2)]).unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(list_contents(&alias), ["1", "2"]);
    }

    #[test]
    fn test_format_substitutes_first_placeholder_only() {
        assert_eq!(
            dispatch("format", s("n={} m={}"), &[Value::Int(4)]).unwrap(),
            s("n=4 m={}")
        );
        assert_eq!(
            dispatch("format", s("no placeholder"), &[Value::Int(4)]).unwrap(),
            s("no placeholder")
        );
    }

    #[test]
    fn test_len_degrades_to_zero() {
        let list = Value::new_list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(dispatch("len", list, &[]).unwrap(), Value::Int(2));
        assert_eq!(dispatch("len", s("four"), &[]).unwrap(), Value::Int(0));
        assert_eq!(dispatch("len", Value::Null, &[]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_str_converts_ints_and_passes_everything_else() {
        assert_eq!(dispatch("str", Value::Int(-9), &[]).unwrap(), s("-9"));
        assert_eq!(dispatch("str", s("kept"), &[]).unwrap(), s("kept"));
        assert_eq!(dispatch("str", Value::Null, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_chr() {
        assert_eq!(dispatch("chr", Value::Int(65), &[]).unwrap(), s("A"));
        assert!(matches!(
            dispatch("chr", Value::Int(-1), &[]),
            Err(VmError::TypeError(_))
        ));
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let result = dispatch("open", s("/nonexistent/ember-test-path"), &[]).unwrap();
        assert_eq!(result, s(""));
    }

    #[test]
    fn test_read_passes_through() {
        assert_eq!(dispatch("read", s("contents"), &[]).unwrap(), s("contents"));
    }

    #[test]
    fn test_wrong_receiver_type() {
        assert!(matches!(
            dispatch("splitlines", Value::Int(1), &[]),
            Err(VmError::TypeError(_))
        ));
        assert!(matches!(
            dispatch("append", s("not a list"), &[Value::Int(1)]),
            Err(VmError::TypeError(_))
        ));
    }

    #[test]
    fn test_call_target_parsing() {
        assert_eq!(parse_call("split").unwrap(), ("split", None));
        assert_eq!(parse_call("split/1").unwrap(), ("split", Some(1)));
        assert!(matches!(
            parse_call("split/x"),
            Err(VmError::MalformedCall(_))
        ));
    }

    #[test]
    fn test_descriptor_table_covers_dispatch() {
        for name in BUILTINS.keys() {
            // Every registered builtin must resolve to a handler arm.
            let result = dispatch(name, Value::Null, &[Value::Null]);
            assert!(
                !matches!(result, Err(VmError::UnknownMethod(_))),
                "no handler for {}",
                name
            );
        }
    }
}
