//! Built-in operations registry.
//!
//! The standard library is defined once, as a single contiguous table of
//! [`BuiltinOp`] entries built on first use. The default environment
//! ([`crate::evaluator::standard_env`]) is populated from this table.
//!
//! ```scheme
//! (+ 1 2 3)                 ; 6, exact decimal arithmetic
//! (/ 4)                     ; 0.25, reciprocal
//! (compare "a" "b")         ; -1
//! (not= status "closed")    ; structural inequality
//! (if (> total 100) "big")  ; nil when the condition is falsy
//! (set order "Total" 10)    ; mutates a host record, returns it
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: receive their arguments already evaluated, left to right
//!   (e.g. `+`, `not`, `get`)
//! - **Special Forms**: receive their arguments unevaluated together with the
//!   environment and current scope, and decide what to evaluate (`if`, `and`,
//!   `or`, `do`)
//!
//! ## Error Handling
//!
//! - Argument counts are validated against each entry's [`Arity`] before the
//!   implementation runs, so arity errors always name the operation.
//! - Arithmetic and ordering reject non-number (or, for ordering, mixed)
//!   arguments with a `TypeError`; nothing is coerced.
//! - Division by zero is an `EvaluationError`.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** as a typed Rust function; see
//!    [`crate::intooperation`] for the supported parameter types
//! 2. **Add it to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use bigdecimal::Zero;

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::{Environment, Scope, SpecialFormFn, eval_and, eval_do, eval_if, eval_or};
use crate::intooperation::{
    IntoOperation, IntoVariadicOperation, NumIterator, NumRest, OperationFn, ValueListIterator,
    ValuesRest,
};
use crate::record::HostRef;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many
    Exact(usize),
    /// This many or more
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    /// Any count, including zero
    Any,
    /// An odd count no smaller than `min`
    Odd { min: usize },
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(min) => count >= min,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
            Arity::Odd { min } => count >= min && count % 2 == 1,
        }
    }

    /// Check `count` arguments passed to `form`
    pub fn validate(&self, form: &str, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(form, *self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
            Arity::Odd { min } => write!(f, "an odd number (at least {min}) of"),
        }
    }
}

/// Represents the implementation of a callable value (function or special form)
#[derive(Clone)]
pub enum OpKind {
    /// Eager function taking evaluated arguments
    Function(Arc<OperationFn>),
    /// Lazy form taking the environment, the current scope and unevaluated arguments
    SpecialForm(Arc<SpecialFormFn>),
}

impl OpKind {
    pub fn is_special_form(&self) -> bool {
        matches!(self, OpKind::SpecialForm(_))
    }
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

impl PartialEq for OpKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OpKind::Function(f1), OpKind::Function(f2)) => Arc::ptr_eq(f1, f2),
            (OpKind::SpecialForm(f1), OpKind::SpecialForm(f2)) => Arc::ptr_eq(f1, f2),
            _ => false,
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name this operation is bound to
    pub id: &'static str,
    /// The implementation, already wrapped with arity validation
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    fn function(id: &'static str, arity: Arity, func: Arc<OperationFn>) -> Self {
        let checked: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(id, args.len())?;
            func(args)
        });
        BuiltinOp {
            id,
            op_kind: OpKind::Function(checked),
            arity,
        }
    }

    fn special_form<F>(id: &'static str, arity: Arity, form: F) -> Self
    where
        F: Fn(&Environment, &Scope, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let checked: Arc<SpecialFormFn> =
            Arc::new(move |env: &Environment, scope: &Scope, args: &[Value]| {
                arity.validate(id, args.len())?;
                form(env, scope, args)
            });
        BuiltinOp {
            id,
            op_kind: OpKind::SpecialForm(checked),
            arity,
        }
    }

    /// The callable value bound under this operation's id
    pub(crate) fn to_value(&self) -> Value {
        Value::Callable {
            id: self.id.to_owned(),
            kind: self.op_kind.clone(),
        }
    }
}

//
// Builtin Function Implementations
//

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

/// `Value` equality already compares numbers by value and everything else structurally
fn builtin_equal(first: Value, mut rest: ValueListIterator<'_>) -> bool {
    rest.all(|v| *v == first)
}

fn builtin_not_equal(first: Value, rest: ValueListIterator<'_>) -> bool {
    !builtin_equal(first, rest)
}

/// Order two values of the same comparable variant
fn compare_values(a: &Value, b: &Value) -> Result<Ordering, Error> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ if std::mem::discriminant(a) != std::mem::discriminant(b) => {
            Err(Error::TypeError(format!(
                "compare expects two arguments of the same type, got {} and {}",
                a.type_name(),
                b.type_name()
            )))
        }
        _ => Err(Error::TypeError(format!(
            "cannot compare values of type {}",
            a.type_name()
        ))),
    }
}

fn builtin_compare(a: Value, b: Value) -> Result<Value, Error> {
    let ordering = compare_values(&a, &b)?;
    Ok(Value::from(ordering as i8))
}

// Macro to generate ordering predicates on top of `compare`
macro_rules! ordering_predicate {
    ($name:ident, $test:ident) => {
        fn $name(a: Value, b: Value) -> Result<bool, Error> {
            Ok(compare_values(&a, &b)?.$test())
        }
    };
}

ordering_predicate!(builtin_lt, is_lt);
ordering_predicate!(builtin_le, is_le);
ordering_predicate!(builtin_gt, is_gt);
ordering_predicate!(builtin_ge, is_ge);

fn builtin_add(nums: NumIterator<'_>) -> NumberType {
    nums.fold(NumberType::from(0), |sum, n| sum + n)
}

fn builtin_sub(first: NumberType, rest: NumIterator<'_>) -> NumberType {
    if rest.len() == 0 {
        return -first;
    }
    rest.fold(first, |acc, n| acc - n)
}

fn builtin_mul(nums: NumIterator<'_>) -> NumberType {
    nums.fold(NumberType::from(1), |product, n| product * n)
}

/// `(/ a b c)` is `1 / a / b / c`
fn builtin_div(nums: NumIterator<'_>) -> Result<NumberType, Error> {
    let mut quotient = NumberType::from(1);
    for n in nums {
        if n.is_zero() {
            return Err(Error::EvalError("division by zero".into()));
        }
        quotient = quotient / n;
    }
    Ok(quotient)
}

fn builtin_get(record: HostRef, field: &str) -> Result<Value, Error> {
    record.get(field)
}

/// `(set record name value name value ...)`, applied atomically
fn builtin_set(record: HostRef, mut pairs: ValueListIterator<'_>) -> Result<HostRef, Error> {
    let mut updates = Vec::with_capacity(pairs.len() / 2);
    while let Some(name) = pairs.next() {
        let Value::String(name) = name else {
            return Err(Error::TypeError(format!(
                "set expects string field names, got {}",
                name.type_name()
            )));
        };
        let value = pairs.next().cloned().unwrap_or(Value::Nil);
        updates.push((name.clone(), value));
    }
    record.set_fields(&updates)?;
    Ok(record)
}

/// Global registry of all built-in operations.
///
/// Built once, on first use. Implementations are wired through the same
/// adapter layer used for host registration.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn fixed<Args, R, F>(id: &'static str, f: F) -> BuiltinOp
    where
        F: IntoOperation<Args, R>,
    {
        let arity = Arity::Exact(<F as IntoOperation<Args, R>>::ARITY);
        BuiltinOp::function(id, arity, f.into_operation(id))
    }

    fn variadic<Args, R, F>(id: &'static str, arity: Arity, f: F) -> BuiltinOp
    where
        F: IntoVariadicOperation<Args, R>,
    {
        BuiltinOp::function(id, arity, f.into_variadic_operation(id))
    }

    vec![
        // Logic
        fixed::<(Value,), bool, _>("not", builtin_not),
        variadic::<(Value, ValuesRest), bool, _>("=", Arity::AtLeast(1), builtin_equal),
        variadic::<(Value, ValuesRest), bool, _>("not=", Arity::AtLeast(1), builtin_not_equal),
        // Ordering
        fixed::<(Value, Value), Value, _>("compare", builtin_compare),
        fixed::<(Value, Value), bool, _>("<", builtin_lt),
        fixed::<(Value, Value), bool, _>("<=", builtin_le),
        fixed::<(Value, Value), bool, _>(">", builtin_gt),
        fixed::<(Value, Value), bool, _>(">=", builtin_ge),
        // Arithmetic
        variadic::<(NumRest,), NumberType, _>("+", Arity::Any, builtin_add),
        variadic::<(NumberType, NumRest), NumberType, _>("-", Arity::AtLeast(1), builtin_sub),
        variadic::<(NumRest,), NumberType, _>("*", Arity::Any, builtin_mul),
        variadic::<(NumRest,), NumberType, _>("/", Arity::AtLeast(1), builtin_div),
        // Host records
        fixed::<(HostRef, &str), Value, _>("get", builtin_get),
        variadic::<(HostRef, ValuesRest), HostRef, _>("set", Arity::Odd { min: 3 }, builtin_set),
        // Special forms
        BuiltinOp::special_form("if", Arity::Range(2, 3), eval_if),
        BuiltinOp::special_form("and", Arity::Any, eval_and),
        BuiltinOp::special_form("or", Arity::Any, eval_or),
        BuiltinOp::special_form("do", Arity::Any, eval_do),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations (for building the standard environment)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}
