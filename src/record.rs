//! Host record capability.
//!
//! Expressions never see host data structures directly. A host exposes a record
//! by implementing [`Record`] and wrapping it in a [`HostRef`]; the `get` and `set`
//! operations then read and write named fields through the trait. Field values
//! convert with [`FromValue`](crate::ast::FromValue), so a typical implementation
//! is a `match` on the field name:
//!
//! ```
//! use bigdecimal::BigDecimal;
//! use rulexpr::{Error, HostRef, Record, Value};
//! use rulexpr::ast::FromValue;
//!
//! struct Listing {
//!     price: BigDecimal,
//!     note: Option<String>,
//! }
//!
//! impl Record for Listing {
//!     fn type_name(&self) -> &str {
//!         "Listing"
//!     }
//!
//!     fn get_field(&self, name: &str) -> Result<Value, Error> {
//!         match name {
//!             "Price" => Ok(self.price.clone().into()),
//!             "Note" => Ok(self.note.clone().into()),
//!             _ => Err(Error::HostCapabilityError(format!("Listing has no field {name}"))),
//!         }
//!     }
//!
//!     fn set_field(&mut self, name: &str, value: Value) -> Result<(), Error> {
//!         match name {
//!             "Price" => self.price = FromValue::from_value(value)?,
//!             "Note" => self.note = FromValue::from_value(value)?,
//!             _ => return Err(Error::HostCapabilityError(format!("Listing has no field {name}"))),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let listing = HostRef::new(Listing { price: BigDecimal::from(10), note: None });
//! assert_eq!(listing.get("Note").unwrap(), Value::Nil);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::Error;
use crate::ast::Value;

/// Named-field access to a host data structure.
pub trait Record: Send + Sync {
    /// Name shown when the record is printed
    fn type_name(&self) -> &str;

    /// Read a field. An absent optional field reads as `Nil`.
    fn get_field(&self, name: &str) -> Result<Value, Error>;

    /// Write a field, converting the value into the field's type. `Nil` clears an
    /// optional field.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), Error>;

    /// Remove a field that did not exist before a failed batch of writes.
    ///
    /// Only records whose set of fields can grow need to implement this.
    fn remove_field(&mut self, name: &str) -> Result<(), Error> {
        Err(Error::HostCapabilityError(format!(
            "{} does not support removing field {name}",
            self.type_name()
        )))
    }

    /// Field names, for hosts that want to enumerate or serialize a record
    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared handle to a host record.
///
/// Cloning the handle shares the record; a `set` through any clone is visible to
/// every holder.
#[derive(Clone)]
pub struct HostRef(Arc<RwLock<dyn Record>>);

impl HostRef {
    pub fn new<R: Record + 'static>(record: R) -> Self {
        HostRef(Arc::new(RwLock::new(record)))
    }

    pub fn type_name(&self) -> String {
        self.0.read().type_name().to_owned()
    }

    /// Read one field. Any failure is reported as a `HostCapabilityError`.
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.0.read().get_field(name).map_err(capability_error)
    }

    /// Write one field
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        self.set_fields(&[(name.to_owned(), value)])
    }

    /// Apply `updates` in order under a single write lock.
    ///
    /// Either every update is applied or none is: if one fails, the fields
    /// already written are restored before the error is returned. A value the
    /// record cannot convert is a `HostCapabilityError`, like a missing field.
    pub fn set_fields(&self, updates: &[(String, Value)]) -> Result<(), Error> {
        let mut record = self.0.write();
        let mut applied: Vec<(&str, Option<Value>)> = Vec::with_capacity(updates.len());

        for (name, value) in updates {
            let previous = record.get_field(name).ok();
            if let Err(err) = record.set_field(name, value.clone()) {
                tracing::debug!(record = record.type_name(), field = %name, %err, "set failed, rolling back");
                for (name, previous) in applied.into_iter().rev() {
                    let restored = match previous {
                        Some(old) => record.set_field(name, old),
                        None => record.remove_field(name),
                    };
                    if let Err(restore_err) = restored {
                        tracing::warn!(field = name, %restore_err, "could not restore field");
                    }
                }
                return Err(capability_error(err));
            }
            applied.push((name.as_str(), previous));
        }

        Ok(())
    }

    /// Lock the record for reading
    pub fn read(&self) -> RwLockReadGuard<'_, dyn Record> {
        self.0.read()
    }

    /// True when both handles share the same record
    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Report a failed field access as a host capability error, keeping its message
fn capability_error(err: Error) -> Error {
    match err {
        Error::HostCapabilityError(_) => err,
        Error::TypeError(msg) | Error::EvalError(msg) => Error::HostCapabilityError(msg),
        other => Error::HostCapabilityError(other.to_string()),
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never block: the record may be locked by the caller
        match self.0.try_read() {
            Some(record) => write!(f, "HostRef(<{}>)", record.type_name()),
            None => write!(f, "HostRef(<locked>)"),
        }
    }
}
