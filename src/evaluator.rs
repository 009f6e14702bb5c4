use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::ast::Value;
use crate::builtinops::{Arity, OpKind, get_builtin_ops};
use crate::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::{Error, catch_abnormal};

/// Erased signature of a special form: the global table, the caller's scope and
/// the unevaluated argument expressions.
pub type SpecialFormFn =
    dyn Fn(&Environment, &Scope, &[Value]) -> Result<Value, Error> + Send + Sync;

/// Global name table
///
/// Lookups fall back to the parent table. The shared standard environment is
/// never mutated; hosts extend it through an [`Environment::overlay`].
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    /// An empty table with no parent
    pub fn new() -> Self {
        Environment::default()
    }

    /// An empty table whose lookups fall back to `parent`
    pub fn overlay(parent: Arc<Environment>) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Bind `name` to any value, shadowing a binding of the same name in a parent
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get(name)))
    }

    /// Register a raw host function working directly on evaluated arguments.
    ///
    /// This is the low-level API; argument counts and types are entirely up to
    /// `func`. Prefer [`Environment::register_builtin_operation`] for new code.
    ///
    /// # Example
    /// ```
    /// use rulexpr::{Error, Scope, Value, create_global_env, eval, read_fully};
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len() as u64))
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_function("count-args", count_args);
    /// let expr = read_fully("(count-args 1 \"two\" nil)").unwrap();
    /// assert_eq!(eval(&env, &Scope::new(), &expr).unwrap(), Value::from(3));
    /// ```
    pub fn register_builtin_function<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.bindings
            .insert(name.to_owned(), Value::function(name, wrapped));
    }

    /// Register a strongly-typed Rust function using automatic argument
    /// extraction and result conversion.
    ///
    /// ```
    /// use bigdecimal::BigDecimal;
    /// use rulexpr::{Scope, Value, create_global_env, eval, read_fully};
    ///
    /// fn safe_div(a: BigDecimal, b: BigDecimal) -> Result<BigDecimal, &'static str> {
    ///     if b == BigDecimal::from(0) { Err("cannot divide by zero") } else { Ok(a / b) }
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_operation::<_, (BigDecimal, BigDecimal), BigDecimal>("safe-div", safe_div);
    /// let expr = read_fully("(safe-div 6 4)").unwrap();
    /// assert_eq!(eval(&env, &Scope::new(), &expr).unwrap(), Value::from(BigDecimal::from(3) / BigDecimal::from(2)));
    /// ```
    ///
    /// Supported parameter types:
    /// - `BigDecimal` (number), `bool` (boolean, no truthiness), `String`
    /// - `&str` (borrowed string slices)
    /// - `Value` (owned access to the raw value)
    /// - `HostRef` (host records)
    /// - `Option<T>` of any of the owned types above (`nil` is `None`)
    /// - `ValueListIterator<'_>`, `NumIterator<'_>`, `StringIterator<'_>`
    ///   (elements of a list argument)
    ///
    /// Supported return types:
    /// - any type `R` where `R: Into<Value>`
    /// - `Result<R, E>` where `E: Display`; a crate [`Error`] is passed through,
    ///   anything else becomes [`Error::EvalError`]
    ///
    /// Arity is enforced automatically and arity errors name the function.
    /// Conversion errors yield `TypeError`.
    pub fn register_builtin_operation<F, Args, R>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args, R> + 'static,
    {
        // The adapter checks its own arity
        self.bindings
            .insert(name.to_owned(), Value::function(name, func.into_operation(name)));
    }

    /// Register a variadic operation with explicit arity metadata.
    ///
    /// For functions whose Rust signature ends in a rest parameter expressed
    /// with the iterator types from [`crate::intooperation`]:
    /// - rest of all arguments as values: `fn(ValueListIterator<'_>) -> R`
    /// - numeric tail: `fn(NumIterator<'_>) -> R`
    /// - fixed prefix plus string tail: `fn(&str, StringIterator<'_>) -> R`
    ///
    /// The provided [`Arity`] validates the total number of arguments at call time.
    pub fn register_variadic_builtin_operation<F, Args, R>(
        &mut self,
        name: &str,
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args, R> + 'static,
    {
        self.define_checked_function(name, arity, func.into_variadic_operation(name));
    }

    /// Register a special form.
    ///
    /// The form receives its argument expressions unevaluated and evaluates them
    /// as it sees fit with [`eval_subform`], possibly under an extended scope.
    pub fn register_special_form<F>(&mut self, name: &str, form: F)
    where
        F: Fn(&Environment, &Scope, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let form: Arc<SpecialFormFn> = Arc::new(form);
        self.bindings.insert(
            name.to_owned(),
            Value::Callable {
                id: name.to_owned(),
                kind: OpKind::SpecialForm(form),
            },
        );
    }

    fn define_checked_function(&mut self, name: &str, arity: Arity, func: Arc<OperationFn>) {
        let id = name.to_owned();
        let checked: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(&id, args.len())?;
            func(args)
        });
        self.bindings
            .insert(name.to_owned(), Value::function(name, checked));
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Parent bindings first, so they can be overridden by local bindings
        if let Some(parent) = &self.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in &self.bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// One lexical frame
pub type Frame = HashMap<String, Value>;

/// Lexical scope: frames ordered outermost first.
///
/// Frames are shared between a scope and the scopes derived from it; pushing a
/// frame or binding into the innermost one never affects another scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    frames: Vec<Arc<Frame>>,
}

impl Scope {
    /// A scope without frames: names resolve in the global table only
    pub fn new() -> Self {
        Scope::default()
    }

    /// Build a scope from host-supplied frames, outermost first
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Scope {
            frames: frames.into_iter().map(Arc::new).collect(),
        }
    }

    /// A copy of this scope with `frame` pushed as the innermost frame
    pub fn with_frame(&self, frame: Frame) -> Scope {
        let mut frames = self.frames.clone();
        frames.push(Arc::new(frame));
        Scope { frames }
    }

    /// Resolve `name`, innermost frame first
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind into the innermost frame, copying it first if it is shared
    fn bind(&mut self, name: String, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                Arc::make_mut(frame).insert(name, value);
            }
            None => self.frames.push(Arc::new(Frame::from([(name, value)]))),
        }
    }
}

/// Evaluate an expression (public API).
///
/// A panic anywhere underneath, including inside host functions, is returned as
/// [`Error::AbnormalTermination`].
pub fn eval(env: &Environment, scope: &Scope, expr: &Value) -> Result<Value, Error> {
    catch_abnormal("eval", || {
        // Formatting the span field runs host code too
        let span = tracing::debug_span!("eval", %expr);
        let _guard = span.enter();
        eval_subform(env, scope, expr)
    })
}

/// Evaluate an expression without installing a panic boundary.
///
/// This is what special forms use for nested evaluation.
pub fn eval_subform(env: &Environment, scope: &Scope, expr: &Value) -> Result<Value, Error> {
    match expr {
        Value::Symbol(name) => scope
            .lookup(name)
            .or_else(|| env.get(name))
            .cloned()
            .ok_or_else(|| Error::UnboundName(name.clone())),

        Value::List(elements) => {
            eval_list(env, scope, elements).map_err(|err| add_context(err, expr))
        }

        // Everything else evaluates to itself
        Value::Number(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Nil
        | Value::Callable { .. }
        | Value::Host(_) => Ok(expr.clone()),
    }
}

const CONTEXT_PREFIX: &str = "\n  while evaluating: ";

/// Name the innermost failing list; outer lists leave the message alone
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains(CONTEXT_PREFIX) => {
            Error::EvalError(format!("{msg}{CONTEXT_PREFIX}{expr}"))
        }
        Error::TypeError(msg) if !msg.contains(CONTEXT_PREFIX) => {
            Error::TypeError(format!("{msg}{CONTEXT_PREFIX}{expr}"))
        }
        other => other,
    }
}

fn eval_list(env: &Environment, scope: &Scope, elements: &[Value]) -> Result<Value, Error> {
    let [head, args @ ..] = elements else {
        return Ok(Value::Nil);
    };

    // `let` is part of the evaluator, not a binding that could be shadowed
    if matches!(head, Value::Symbol(name) if name == "let") {
        return eval_let(env, scope, args);
    }

    match eval_subform(env, scope, head)? {
        Value::Callable {
            id,
            kind: OpKind::Function(func),
        } => {
            let values = args
                .iter()
                .map(|arg| eval_subform(env, scope, arg))
                .collect::<Result<Vec<_>, _>>()?;
            tracing::trace!(function = %id, argc = values.len(), "call");
            func(values)
        }
        Value::Callable {
            id,
            kind: OpKind::SpecialForm(form),
        } => {
            tracing::trace!(special_form = %id, argc = args.len(), "call");
            form(env, scope, args)
        }
        _ => Err(Error::NotCallable(head.to_string())),
    }
}

/// `(let name expr name expr ... body)`
///
/// Bindings are evaluated in order, each seeing the ones before it, into one new
/// frame on a copy of the caller's scope.
fn eval_let(env: &Environment, scope: &Scope, args: &[Value]) -> Result<Value, Error> {
    let Some((body, bindings)) = args.split_last().filter(|_| args.len() % 2 == 1) else {
        return Err(Error::arity_error("let", Arity::Odd { min: 1 }, args.len()));
    };

    let mut inner = scope.with_frame(Frame::new());
    for pair in bindings.chunks_exact(2) {
        let [name, expr] = pair else { continue };
        let Value::Symbol(name) = name else {
            return Err(Error::TypeError(format!(
                "let binding names must be symbols, got {name}"
            )));
        };
        let value = eval_subform(env, &inner, expr)?;
        tracing::trace!(%name, %value, "let binding");
        inner.bind(name.clone(), value);
    }

    eval_subform(env, &inner, body)
}

/// `(if condition then [else])`; a falsy condition without else gives `nil`
pub(crate) fn eval_if(env: &Environment, scope: &Scope, args: &[Value]) -> Result<Value, Error> {
    match args {
        [condition, then_expr, rest @ ..] if rest.len() <= 1 => {
            if eval_subform(env, scope, condition)?.is_truthy() {
                eval_subform(env, scope, then_expr)
            } else if let [else_expr] = rest {
                eval_subform(env, scope, else_expr)
            } else {
                Ok(Value::Nil)
            }
        }
        _ => Err(Error::arity_error("if", Arity::Range(2, 3), args.len())),
    }
}

macro_rules! short_circuit_form {
    ($name:ident, $stop_when_truthy:literal, $empty:expr) => {
        pub(crate) fn $name(
            env: &Environment,
            scope: &Scope,
            args: &[Value],
        ) -> Result<Value, Error> {
            let mut result = $empty;
            for arg in args {
                result = eval_subform(env, scope, arg)?;
                if result.is_truthy() == $stop_when_truthy {
                    break;
                }
            }
            Ok(result)
        }
    };
}

// `and` stops at the first falsy result, `or` at the first truthy one; both
// otherwise return the last result
short_circuit_form!(eval_and, false, Value::Bool(true));
short_circuit_form!(eval_or, true, Value::Nil);

/// `(do expr ...)`: evaluate everything, return the last result
pub(crate) fn eval_do(env: &Environment, scope: &Scope, args: &[Value]) -> Result<Value, Error> {
    args.iter()
        .try_fold(Value::Nil, |_, arg| eval_subform(env, scope, arg))
}

static STANDARD_ENV: LazyLock<Arc<Environment>> = LazyLock::new(|| {
    let mut env = Environment::new();

    env.define("nil", Value::Nil);
    env.define("true", true);
    env.define("false", false);

    for builtin_op in get_builtin_ops() {
        env.bindings
            .insert(builtin_op.id.to_owned(), builtin_op.to_value());
    }

    Arc::new(env)
});

/// The shared, immutable standard environment
pub fn standard_env() -> Arc<Environment> {
    Arc::clone(&STANDARD_ENV)
}

/// A fresh environment on top of the standard one, ready for host definitions
pub fn create_global_env() -> Environment {
    Environment::overlay(standard_env())
}
