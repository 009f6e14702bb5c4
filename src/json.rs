//! JSON-backed host records.
//!
//! [`JsonRecord`] is a ready-made [`Record`] over a JSON object, so a host can
//! expose request payloads or documents to expressions without writing its own
//! record type. Nested objects become nested records, arrays become lists and
//! numbers become exact decimals.
//!
//! ```
//! use rulexpr::{HostRef, Scope, Value, create_global_env, eval, read_fully};
//! use rulexpr::json::JsonRecord;
//!
//! let order = JsonRecord::from_json(&serde_json::json!({"Total": 120.5, "Status": "open"})).unwrap();
//! let mut env = create_global_env();
//! env.define("order", HostRef::new(order));
//!
//! let expr = read_fully(r#"(if (> (get order "Total") 100) "big" "small")"#).unwrap();
//! assert_eq!(eval(&env, &Scope::new(), &expr).unwrap(), Value::from("big"));
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Map, Number};

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::record::{HostRef, Record};

/// A record whose fields are the members of a JSON object.
///
/// Unlike a typed record, any field may be set; setting an unknown field adds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonRecord {
    fields: BTreeMap<String, Value>,
}

impl JsonRecord {
    pub fn new() -> Self {
        JsonRecord::default()
    }

    /// Convert a JSON object; any other JSON value is a `TypeError`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        let serde_json::Value::Object(members) = json else {
            return Err(Error::TypeError(format!(
                "expected JSON object, got {}",
                json_type_name(json)
            )));
        };

        let fields = members
            .iter()
            .map(|(name, member)| Ok((name.clone(), Value::from_json(member)?)))
            .collect::<Result<BTreeMap<_, _>, Error>>()?;

        Ok(JsonRecord { fields })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        let members = self
            .fields
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.to_json()?)))
            .collect::<Result<Map<_, _>, Error>>()?;

        Ok(serde_json::Value::Object(members))
    }
}

impl Record for JsonRecord {
    fn type_name(&self) -> &str {
        "object"
    }

    fn get_field(&self, name: &str) -> Result<Value, Error> {
        self.fields
            .get(name)
            .cloned()
            .ok_or_else(|| Error::HostCapabilityError(format!("object has no field {name}")))
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.fields.insert(name.to_owned(), value);
        Ok(())
    }

    fn remove_field(&mut self, name: &str) -> Result<(), Error> {
        self.fields.remove(name);
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl Value {
    /// Convert JSON into a value; objects become shared [`JsonRecord`]s.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, Error> {
        Ok(match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                let number = NumberType::from_str(&text).map_err(|_| {
                    Error::HostCapabilityError(format!("JSON number {text} has no decimal form"))
                })?;
                Value::Number(number)
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            serde_json::Value::Object(_) => Value::Host(HostRef::new(JsonRecord::from_json(json)?)),
        })
    }

    /// Convert a value into JSON.
    ///
    /// Symbols become strings and any record is written out through its
    /// [`Record::field_names`]. Callables have no JSON form. A record that
    /// contains itself is not supported.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        match self {
            Value::Nil => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => {
                let text = n.to_plain_string();
                Number::from_str(&text)
                    .map(serde_json::Value::Number)
                    .map_err(|_| {
                        Error::HostCapabilityError(format!("number {text} has no JSON form"))
                    })
            }
            Value::String(s) | Value::Symbol(s) => Ok(serde_json::Value::String(s.clone())),
            Value::List(items) => Ok(serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Value::Host(host) => {
                let record = host.read();
                let members = record
                    .field_names()
                    .into_iter()
                    .map(|name| {
                        let member = record.get_field(&name)?.to_json()?;
                        Ok((name, member))
                    })
                    .collect::<Result<Map<_, _>, Error>>()?;
                Ok(serde_json::Value::Object(members))
            }
            Value::Callable { id, .. } => Err(Error::HostCapabilityError(format!(
                "{id} has no JSON form"
            ))),
        }
    }
}
