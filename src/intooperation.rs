//! Adapters turning strongly-typed Rust functions into host functions.
//!
//! Every host function is stored behind the erased [`OperationFn`] signature. The
//! traits here let a plain Rust function or closure stand in for that signature:
//! arguments are converted with [`FromParam`] (scalars through
//! [`FromValue`](crate::ast::FromValue), plus borrowed `&str` and list iterators),
//! variadic tails are exposed through [`FromRest`] iterators, and results are
//! normalized through [`IntoResult`].
//!
//! Adapters are built with the id the function is registered under, so a call
//! with the wrong number of arguments names the function it was meant for.

use std::any::Any;
use std::fmt::Display;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::slice;
use std::sync::Arc;

use crate::Error;
use crate::ast::{FromValue, NumberType, Value, type_mismatch};
use crate::builtinops::Arity;

/// Erased host function: takes ownership of the evaluated arguments.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Turns one evaluated argument into a strongly-typed parameter.
///
/// `Param<'a>` is what the function receives. It may borrow from the local
/// argument slot (`&str`, list iterators) or own a value moved out of it.
pub trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl<T: FromValue> FromParam for T {
    type Param<'a> = T;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        T::from_value(std::mem::replace(slot, Value::Nil))
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match slot {
            Value::String(s) => Ok(s.as_str()),
            other => Err(type_mismatch("string", other)),
        }
    }
}

/// Builds a rest parameter from the arguments after the fixed prefix.
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(tail: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

/// Marks the rest position in an `Args` tuple; `I` names the iterator type.
#[derive(Debug, Clone, Copy)]
pub struct Rest<I>(PhantomData<I>);

pub type ValuesRest = Rest<ValueListIterator<'static>>;
pub type NumRest = Rest<NumIterator<'static>>;
pub type StringRest = Rest<StringIterator<'static>>;

/// Result normalization for host functions.
///
/// A plain return value is `Ok`. A crate [`Error`] passes through unchanged;
/// any other error type becomes [`Error::EvalError`] with its `Display` text.
pub trait IntoResult<T> {
    fn into_result(self) -> Result<T, Error>;
}

impl<T> IntoResult<T> for T {
    fn into_result(self) -> Result<T, Error> {
        Ok(self)
    }
}

impl<T, E> IntoResult<T> for Result<T, E>
where
    E: Display + 'static,
{
    fn into_result(self) -> Result<T, Error> {
        self.map_err(|e| match (&e as &dyn Any).downcast_ref::<Error>() {
            Some(err) => err.clone(),
            None => Error::EvalError(e.to_string()),
        })
    }
}

/// Borrowed iterator over every element of a sequence argument.
#[derive(Debug, Clone)]
pub struct ValueListIterator<'a> {
    inner: slice::Iter<'a, Value>,
}

impl<'a> ValueListIterator<'a> {
    fn over(values: &'a [Value]) -> Result<Self, Error> {
        Ok(ValueListIterator {
            inner: values.iter(),
        })
    }
}

impl<'a> Iterator for ValueListIterator<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ValueListIterator<'_> {}
impl FusedIterator for ValueListIterator<'_> {}

/// Declares an iterator whose elements all match one `Value` variant.
///
/// The whole sequence is checked when the iterator is built, so a function
/// never sees it fail halfway through.
macro_rules! typed_iterator {
    ($(#[$meta:meta])* $name:ident yields $item:ty, $expected:literal, $pattern:pat => $element:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name<'a> {
            inner: slice::Iter<'a, Value>,
        }

        impl<'a> $name<'a> {
            fn element(value: &'a Value) -> Option<&'a $item> {
                match value {
                    $pattern => Some($element),
                    _ => None,
                }
            }

            fn over(values: &'a [Value]) -> Result<Self, Error> {
                match values.iter().find(|value| Self::element(value).is_none()) {
                    Some(bad) => Err(type_mismatch($expected, bad)),
                    None => Ok($name {
                        inner: values.iter(),
                    }),
                }
            }
        }

        impl<'a> Iterator for $name<'a> {
            type Item = &'a $item;

            fn next(&mut self) -> Option<&'a $item> {
                self.inner.by_ref().find_map(Self::element)
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        impl ExactSizeIterator for $name<'_> {}
        impl FusedIterator for $name<'_> {}
    };
}

typed_iterator!(
    /// Borrowed iterator over number arguments
    NumIterator yields NumberType, "number", Value::Number(n) => n
);
typed_iterator!(
    /// Borrowed iterator over string arguments
    StringIterator yields str, "string", Value::String(s) => s.as_str()
);

/// A sequence type works both as a list parameter and as a rest parameter.
macro_rules! sequence_parameter {
    ($($name:ident),+) => {$(
        impl FromParam for $name<'_> {
            type Param<'a> = $name<'a>;

            fn from_arg<'a>(slot: &'a mut Value) -> Result<Self::Param<'a>, Error> {
                match slot {
                    Value::List(items) => $name::over(items),
                    other => Err(type_mismatch("list", other)),
                }
            }
        }

        impl FromRest for $name<'static> {
            type Param<'a> = $name<'a>;

            fn from_rest<'a>(tail: &'a [Value]) -> Result<Self::Param<'a>, Error> {
                $name::over(tail)
            }
        }
    )+};
}

sequence_parameter!(ValueListIterator, NumIterator, StringIterator);

/// Move exactly `N` arguments into local slots.
fn exact_slots<const N: usize>(id: &str, args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::arity_error(id, Arity::Exact(N), got))
}

/// Move the first `N` arguments into local slots and keep the tail.
fn prefix_slots<const N: usize>(
    id: &str,
    mut args: Vec<Value>,
) -> Result<([Value; N], Vec<Value>), Error> {
    let got = args.len();
    let tail = if got >= N { args.split_off(N) } else { Vec::new() };
    let prefix =
        <[Value; N]>::try_from(args).map_err(|_| Error::arity_error(id, Arity::AtLeast(N), got))?;
    Ok((prefix, tail))
}

/// A function taking a fixed number of [`FromParam`] parameters, described by
/// the `Args` tuple.
pub trait IntoOperation<Args, R> {
    const ARITY: usize;

    /// Erase the function; `id` names it in arity errors.
    fn into_operation(self, id: &str) -> Arc<OperationFn>;
}

/// A function taking a fixed prefix of [`FromParam`] parameters followed by a
/// rest parameter (`ValueListIterator`, `NumIterator` or `StringIterator`).
pub trait IntoVariadicOperation<Args, R> {
    /// Erase the function; `id` names it in arity errors.
    fn into_variadic_operation(self, id: &str) -> Arc<OperationFn>;
}

macro_rules! fixed_arity_adapter {
    ($arity:literal $(, $slot:ident : $A:ident)*) => {
        impl<F, FR, R $(, $A)*> IntoOperation<($($A,)*), R> for F
        where
            $($A: FromParam,)*
            F: for<'a> Fn($(<$A as FromParam>::Param<'a>),*) -> FR + Send + Sync + 'static,
            FR: IntoResult<R> + 'static,
            R: Into<Value> + 'static,
        {
            const ARITY: usize = $arity;

            fn into_operation(self, id: &str) -> Arc<OperationFn> {
                let id = id.to_owned();
                Arc::new(move |args: Vec<Value>| {
                    let [$(mut $slot),*] = exact_slots::<$arity>(&id, args)?;
                    let result: FR = (self)($(<$A as FromParam>::from_arg(&mut $slot)?),*);
                    let value: R = result.into_result()?;
                    Ok(value.into())
                })
            }
        }
    };
}

fixed_arity_adapter!(0);
fixed_arity_adapter!(1, a: A1);
fixed_arity_adapter!(2, a: A1, b: A2);
fixed_arity_adapter!(3, a: A1, b: A2, c: A3);
fixed_arity_adapter!(4, a: A1, b: A2, c: A3, d: A4);

macro_rules! variadic_adapter {
    ($prefix:literal $(, $slot:ident : $A:ident)*) => {
        impl<F, FR, R, I $(, $A)*> IntoVariadicOperation<($($A,)* Rest<I>,), R> for F
        where
            I: FromRest,
            $($A: FromParam,)*
            F: for<'a> Fn($(<$A as FromParam>::Param<'a>,)* <I as FromRest>::Param<'a>) -> FR
                + Send
                + Sync
                + 'static,
            FR: IntoResult<R> + 'static,
            R: Into<Value> + 'static,
        {
            fn into_variadic_operation(self, id: &str) -> Arc<OperationFn> {
                let id = id.to_owned();
                Arc::new(move |args: Vec<Value>| {
                    let ([$(mut $slot),*], tail) = prefix_slots::<$prefix>(&id, args)?;
                    let result: FR = (self)(
                        $(<$A as FromParam>::from_arg(&mut $slot)?,)*
                        <I as FromRest>::from_rest(&tail)?,
                    );
                    let value: R = result.into_result()?;
                    Ok(value.into())
                })
            }
        }
    };
}

variadic_adapter!(0);
variadic_adapter!(1, a: A1);
variadic_adapter!(2, a: A1, b: A2);
variadic_adapter!(3, a: A1, b: A2, c: A3);
