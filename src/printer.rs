use std::fmt;

use crate::ast::Value;
use crate::builtinops::OpKind;
use crate::{Error, catch_abnormal};

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::List(list) => {
                write!(f, "(")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            // No escaping: the reader takes strings verbatim too
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Number(n) => write!(f, "{}", n.to_plain_string()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nil"),
            Value::Callable {
                id,
                kind: OpKind::Function(_),
            } => write!(f, "#<function:{id}>"),
            Value::Callable {
                id,
                kind: OpKind::SpecialForm(_),
            } => write!(f, "#<special-form:{id}>"),
            Value::Host(record) => write!(f, "#<record:{}>", record.type_name()),
        }
    }
}

/// Render `value` as canonical text.
///
/// Never fails: if rendering faults (for instance inside a host record's
/// `type_name`), the fault's message is returned as the text.
pub fn print(value: &Value) -> String {
    match catch_abnormal("print", || Ok(value.to_string())) {
        Ok(text) => text,
        Err(Error::AbnormalTermination { message, .. }) => message,
        Err(other) => other.to_string(),
    }
}
