//! Built-in expression functions.
//!
//! Every function takes already-evaluated [`Value`] arguments and returns a
//! `Value`. Operand type mismatches come back as [`Value::Error`] rather than
//! a Rust error, so the caller decides whether they abort the request.

use std::fmt;

use crate::value::{Number, Value};

/// The built-in functions of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionName {
    AttributeExists,
    AttributeNotExists,
    AttributeType,
    BeginsWith,
    Contains,
    Size,
    IfNotExists,
    ListAppend,
}

impl FunctionName {
    /// Look up a function by its exact name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "attribute_exists" => Self::AttributeExists,
            "attribute_not_exists" => Self::AttributeNotExists,
            "attribute_type" => Self::AttributeType,
            "begins_with" => Self::BeginsWith,
            "contains" => Self::Contains,
            "size" => Self::Size,
            "if_not_exists" => Self::IfNotExists,
            "list_append" => Self::ListAppend,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::AttributeType => "attribute_type",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
            Self::Size => "size",
            Self::IfNotExists => "if_not_exists",
            Self::ListAppend => "list_append",
        }
    }

    /// Number of arguments the function takes.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::AttributeExists | Self::AttributeNotExists | Self::Size => 1,
            _ => 2,
        }
    }

    /// Whether the first argument must be a document path.
    #[must_use]
    pub fn requires_path(&self) -> bool {
        !matches!(self, Self::ListAppend)
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static UNDEFINED: Value = Value::Undefined;

const TYPE_CODES: [&str; 10] = ["S", "N", "B", "BOOL", "NULL", "L", "M", "SS", "NS", "BS"];

/// Apply `function` to `args`. The argument count is checked by the parser.
#[must_use]
pub fn call(function: FunctionName, args: &[Value]) -> Value {
    if let Some(err) = args.iter().find(|v| matches!(v, Value::Error(_))) {
        return err.clone();
    }
    let first = args.first().unwrap_or(&UNDEFINED);
    let second = args.get(1).unwrap_or(&UNDEFINED);
    match function {
        FunctionName::AttributeExists => Value::Boolean(!first.is_undefined()),
        FunctionName::AttributeNotExists => Value::Boolean(first.is_undefined()),
        FunctionName::AttributeType => attribute_type(first, second),
        FunctionName::BeginsWith => begins_with(first, second),
        FunctionName::Contains => contains(first, second),
        FunctionName::Size => size(first),
        FunctionName::IfNotExists => {
            if first.is_undefined() {
                second.clone()
            } else {
                first.clone()
            }
        }
        FunctionName::ListAppend => list_append(first, second),
    }
}

fn attribute_type(value: &Value, code: &Value) -> Value {
    let Value::String(code) = code else {
        return Value::error(format!("invalid type {}", code.type_name()));
    };
    if !TYPE_CODES.contains(&code.as_str()) {
        return Value::error(format!("invalid type {code}"));
    }
    Value::Boolean(!value.is_undefined() && value.type_name() == code)
}

fn begins_with(value: &Value, prefix: &Value) -> Value {
    match (value, prefix) {
        (Value::Undefined, _) => Value::Boolean(false),
        (Value::String(s), Value::String(p)) => Value::Boolean(s.starts_with(p.as_str())),
        (Value::Binary(b), Value::Binary(p)) => Value::Boolean(b.starts_with(p)),
        (Value::String(_) | Value::Binary(_), other) => {
            Value::error(format!("invalid substr type {}", other.type_name()))
        }
        (other, _) => Value::error(format!("invalid type {}", other.type_name())),
    }
}

fn contains(value: &Value, operand: &Value) -> Value {
    let found = match (value, operand) {
        (Value::Undefined, _) => false,
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::Binary(b), Value::Binary(sub)) => {
            sub.is_empty() || b.windows(sub.len()).any(|w| w == &sub[..])
        }
        (Value::StringSet(set), Value::String(s)) => set.contains(s),
        (Value::NumberSet(set), Value::Number(n)) => set.contains(n),
        (Value::BinarySet(set), Value::Binary(b)) => set.contains(b),
        (Value::List(items), operand) => items.contains(operand),
        (
            Value::String(_)
            | Value::Binary(_)
            | Value::StringSet(_)
            | Value::NumberSet(_)
            | Value::BinarySet(_),
            operand,
        ) => {
            return Value::error(format!(
                "contains is not supported for path={} operand={}",
                value.type_name(),
                operand.type_name()
            ));
        }
        (other, _) => {
            return Value::error(format!(
                "contains is not supported for path={}",
                other.type_name()
            ));
        }
    };
    Value::Boolean(found)
}

fn size(value: &Value) -> Value {
    let len = match value {
        Value::Undefined => return Value::Undefined,
        Value::String(s) => s.len(),
        Value::Binary(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::StringSet(set) => set.len(),
        Value::NumberSet(set) => set.len(),
        Value::BinarySet(set) => set.len(),
        other => {
            return Value::error(format!(
                "size is not supported for type={}",
                other.type_name()
            ));
        }
    };
    Value::Number(Number::from(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn list_append(first: &Value, second: &Value) -> Value {
    match (first, second) {
        (Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Value::List(out)
        }
        (Value::List(_), other) => Value::error(format!(
            "list_append is not supported for list2={}",
            other.type_name()
        )),
        (other, _) => Value::error(format!(
            "list_append is not supported for list1={}",
            other.type_name()
        )),
    }
}
