//! RuleXpr - embeddable S-expression rule and formula evaluator
//!
//! This crate provides a small expression language meant to be linked into a host
//! program as a rule/formula engine: user-configurable conditions and computations
//! over host data. Expressions are read from text, evaluated against a host-supplied
//! environment, and printed back to canonical text.
//!
//! ```scheme
//! (+ 1 2 3)                          ; exact decimal arithmetic
//! (let rate 0.07 (* price rate))     ; sequential lexical bindings
//! (if (> (get order "Total") 100) "big" "small")
//! (and (not= status "closed") (or vip (>= score 3)))
//! ```
//!
//! ## Semantics
//!
//! - Numbers are arbitrary precision decimals; `1` equals `1.0` and no digit is ever
//!   rounded away by a float conversion.
//! - Only `nil` and `false` are falsy. Zero, `""` and `()` are all truthy.
//! - There are no user-defined functions. Everything callable is supplied by the host,
//!   either as an eager function or as a lazy special form that decides for itself
//!   which of its arguments to evaluate.
//! - `let` is built into the evaluator and binds names sequentially in a fresh frame.
//! - Host records are reachable only through the [`record::Record`] capability used by
//!   `get` and `set`.
//!
//! ## Entry points
//!
//! [`read`], [`read_fully`], [`eval`] and [`print`] never panic: a fault raised
//! anywhere underneath them (including inside host functions) is turned into
//! [`Error::AbnormalTermination`].
//!
//! ```
//! use rulexpr::{Scope, create_global_env, eval, print, read_fully};
//!
//! let env = create_global_env();
//! let expr = read_fully("(let a 2 (+ 1 a))").unwrap();
//! let result = eval(&env, &Scope::new(), &expr).unwrap();
//! assert_eq!(print(&result), "3");
//! ```
//!
//! ## Modules
//!
//! - `ast`: the value model and tree traversal
//! - `reader`: text to values
//! - `printer`: values to text
//! - `evaluator`: environments, scopes and evaluation
//! - `builtinops`: the standard library registry
//! - `intooperation`: adapters turning typed Rust functions into host functions
//! - `record`: the host record capability behind `get` and `set`
//! - `json`: a ready-made record over JSON objects (feature `json`)

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod intooperation;
pub mod printer;
pub mod reader;
pub mod record;

#[cfg(feature = "json")]
pub mod json;

pub use ast::{Value, traverse_lists};
pub use builtinops::Arity;
pub use evaluator::{Environment, Scope, create_global_env, eval, eval_subform, standard_env};
pub use printer::print;
pub use reader::{read, read_fully};
pub use record::{HostRef, Record};

/// Categorizes the different kinds of reader failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyntaxErrorKind {
    /// A delimiter (`) [ ] { } , .`) appeared where a form was expected
    UnexpectedCharacter,
    /// Input ended where a form or a closing parenthesis was expected
    UnexpectedEnd,
    /// A string literal was not closed by a double quote
    UnterminatedString,
    /// A numeric literal contained an invalid character or a trailing dot
    MalformedNumber,
    /// Extra input found after a complete form
    TrailingContent,
    /// The requested start index is outside the text or splits a character
    InvalidStartIndex,
}

/// A structured error describing where and why reading failed.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    /// Byte offset into the full input text
    pub position: usize,
    /// The offending character or token, if identifiable
    pub found: Option<String>,
}

impl SyntaxError {
    pub fn new(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        position: usize,
        found: Option<String>,
    ) -> Self {
        SyntaxError {
            kind,
            message: message.into(),
            position,
            found,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)?;
        if let Some(found) = &self.found {
            write!(f, " (found '{found}')")?;
        }
        Ok(())
    }
}

/// Error types for the reader and the evaluator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    SyntaxError(SyntaxError),
    #[error("ArityError: {form} expects {expected} arguments, got {got}")]
    ArityError {
        form: String,
        expected: Arity,
        got: usize,
    },
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("Unbound name: {0}")]
    UnboundName(String),
    #[error("Not a special form and not a function: {0}")]
    NotCallable(String),
    #[error("HostCapabilityError: {0}")]
    HostCapabilityError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("AbnormalTermination in {operation}: {message}")]
    AbnormalTermination { operation: String, message: String },
}

impl Error {
    pub fn arity_error(form: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityError {
            form: form.into(),
            expected,
            got,
        }
    }

    pub(crate) fn syntax(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        position: usize,
        found: Option<String>,
    ) -> Self {
        Error::SyntaxError(SyntaxError::new(kind, message, position, found))
    }
}

/// Run one public operation, converting any panic underneath it into
/// [`Error::AbnormalTermination`].
pub(crate) fn catch_abnormal<T>(
    operation: &str,
    f: impl FnOnce() -> Result<T, Error>,
) -> Result<T, Error> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(operation, %message, "abnormal termination");
            Err(Error::AbnormalTermination {
                operation: operation.to_owned(),
                message,
            })
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic occurred".to_owned()
    }
}
