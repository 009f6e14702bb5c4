//! This module defines the value model shared by the reader, the evaluator and the
//! printer. The main enum, [`Value`], is a closed set of variants: lists, symbols,
//! strings, exact decimal numbers, booleans, `nil`, host-supplied callables and opaque
//! host records. Conversion traits are provided in both directions: `From` impls build
//! values from Rust literals, slices and vectors, while [`FromValue`] narrows a value
//! back to a Rust type for typed host functions and record fields. Equality is
//! customized so that numbers compare by arithmetic value and callables by identity.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::Error;
use crate::builtinops::OpKind;
use crate::record::HostRef;

/// Type alias for number values in the interpreter
pub type NumberType = BigDecimal;

/// Core value type of the interpreter
///
/// To build values in code and tests, use the `From` impls or the constructors:
/// - `Value::from(42)` / `Value::from("text")` for literals
/// - `Value::symbol("name")` for symbols, `Value::Nil` for nil
/// - `Value::from(vec![Value::symbol("+"), Value::from(1)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Ordered sequence of values (the only composite variant)
    List(Vec<Value>),
    /// Names, used both as literal atoms and as references to resolve
    Symbol(String),
    /// String literals, kept verbatim
    String(String),
    /// Arbitrary precision decimal numbers
    Number(NumberType),
    /// Boolean values
    Bool(bool),
    /// The absent value
    Nil,
    /// Host-supplied function or special form, printed by its id.
    /// Two callables are equal when they share both id and implementation.
    Callable { id: String, kind: OpKind },
    /// Opaque host record, only reachable through `get` and `set`
    Host(HostRef),
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    /// Parse a decimal literal into a number value.
    pub fn number(literal: &str) -> Result<Self, Error> {
        BigDecimal::from_str(literal.strip_prefix('+').unwrap_or(literal))
            .map(Value::Number)
            .map_err(|e| Error::TypeError(format!("not a decimal number '{literal}': {e}")))
    }

    /// Everything except `nil` and `false` is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Short variant name used in type error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::List(_) => "list",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Nil => "nil",
            Value::Callable {
                kind: OpKind::Function(_),
                ..
            } => "function",
            Value::Callable {
                kind: OpKind::SpecialForm(_),
                ..
            } => "special form",
            Value::Host(_) => "record",
        }
    }
}

/// Walk `expr` depth-first in pre-order, calling `visit` on every list node
/// (nested and empty lists included).
///
/// Stops at the first error returned by `visit` and hands it back unchanged;
/// the walk itself never fails.
pub fn traverse_lists<E>(
    expr: &Value,
    visit: &mut impl FnMut(&[Value]) -> Result<(), E>,
) -> Result<(), E> {
    if let Value::List(elements) = expr {
        visit(elements)?;
        for element in elements {
            traverse_lists(element, visit)?;
        }
    }
    Ok(())
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Number(n) => write!(f, "Number({})", n.to_plain_string()),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Nil => write!(f, "Nil"),
            Value::Callable { id, kind } => write!(f, "Callable({id}, {kind:?})"),
            Value::Host(record) => write!(f, "Host({record:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            // BigDecimal equality is by value: 1 == 1.0
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Callable { id: id1, kind: k1 }, Value::Callable { id: id2, kind: k2 }) => {
                id1 == id2 && k1 == k2
            }
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            _ => false, // Different variants are never equal
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<HostRef> for Value {
    fn from(record: HostRef) -> Self {
        Value::Host(record)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(BigDecimal::from(n))
            }
        }
    };
}

// Generate From implementations for all integer types
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);
impl_from_integer!(u64);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::List(slice.iter().cloned().map(|x| x.into()).collect())
    }
}

// Fallible conversions from `Value` back into Rust types.

/// Narrow a [`Value`] into a Rust type.
///
/// Used by the typed host function adapters and by [`crate::record::Record`]
/// implementations converting a value into a field's type. `Option<T>` maps `nil`
/// to `None` and anything else through `T`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, Error>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl FromValue for NumberType {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(type_mismatch("number", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(type_mismatch("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(type_mismatch("string", &other)),
        }
    }
}

impl FromValue for HostRef {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Host(record) => Ok(record),
            other => Err(type_mismatch("record", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

pub(crate) fn type_mismatch(expected: &str, found: &Value) -> Error {
    Error::TypeError(format!("expected {expected}, got {}", found.type_name()))
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating decimal values from literal text
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn dec(literal: &str) -> Value {
    match Value::number(literal) {
        Ok(v) => v,
        Err(e) => panic!("bad decimal literal in test: {e}"),
    }
}

impl Value {
    /// Wrap a shared host function under `id`
    pub(crate) fn function(id: &str, func: Arc<crate::intooperation::OperationFn>) -> Self {
        Value::Callable {
            id: id.to_owned(),
            kind: OpKind::Function(func),
        }
    }
}
