//! End-to-end scenarios through the public API: read, evaluate against a host
//! environment, print.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bigdecimal::BigDecimal;
use pretty_assertions::assert_eq;
use rulexpr::ast::FromValue;
use rulexpr::evaluator::Frame;
use rulexpr::{
    Arity, Environment, Error, HostRef, Record, Scope, SyntaxErrorKind, Value, create_global_env,
    eval, print, read, read_fully, traverse_lists,
};

/// Read, evaluate and print one expression
fn run(env: &Environment, input: &str) -> Result<String, Error> {
    let expr = read_fully(input)?;
    let value = eval(env, &Scope::new(), &expr)?;
    Ok(print(&value))
}

struct Order {
    total: BigDecimal,
    status: String,
    coupon: Option<String>,
}

impl Record for Order {
    fn type_name(&self) -> &str {
        "Order"
    }

    fn get_field(&self, name: &str) -> Result<Value, Error> {
        match name {
            "Total" => Ok(self.total.clone().into()),
            "Status" => Ok(self.status.clone().into()),
            "Coupon" => Ok(self.coupon.clone().into()),
            _ => Err(Error::HostCapabilityError(format!("Order has no field {name}"))),
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), Error> {
        match name {
            "Total" => self.total = FromValue::from_value(value)?,
            "Status" => self.status = FromValue::from_value(value)?,
            "Coupon" => self.coupon = FromValue::from_value(value)?,
            _ => return Err(Error::HostCapabilityError(format!("Order has no field {name}"))),
        }
        Ok(())
    }
}

fn order_env() -> (Environment, HostRef) {
    let order = HostRef::new(Order {
        total: BigDecimal::from(150),
        status: "open".into(),
        coupon: None,
    });
    let mut env = create_global_env();
    env.define("order", order.clone());
    (env, order)
}

#[test]
fn basic_expressions() {
    let env = create_global_env();

    let cases = [
        ("(let a 2 (+ 1 a))", "3"),
        ("(if false 1 2)", "2"),
        ("(if nil 1)", "nil"),
        ("(+ 0.1 0.2)", "0.3"),
        ("(* 1.5 4)", "6.0"),
        ("(/ 8)", "0.125"),
        ("(- 10 2.5)", "7.5"),
        ("(compare 2 10)", "-1"),
        ("(= 1 1.0 1.00)", "true"),
        ("(and 1 \"x\" ())", "()"),
        ("(or nil false)", "false"),
        ("(do 1 2 \"last\")", "\"last\""),
        ("(let a 1 b (+ a 1) c (* b 10) (+ a b c))", "23"),
    ];

    for (input, expected) in cases {
        assert_eq!(run(&env, input).unwrap(), expected, "{input}");
    }
}

#[test]
fn unbound_names_and_argument_errors() {
    let (env, _) = order_env();

    assert_eq!(run(&env, "x").unwrap_err(), Error::UnboundName("x".into()));
    assert_eq!(
        run(&env, "(get order)").unwrap_err(),
        Error::arity_error("get", Arity::Exact(2), 1)
    );
    assert_eq!(
        run(&env, "(set order \"Total\")").unwrap_err(),
        Error::arity_error("set", Arity::Odd { min: 3 }, 2)
    );
    assert!(matches!(
        run(&env, "(\"not callable\" 1)").unwrap_err(),
        Error::NotCallable(_)
    ));
    assert!(matches!(
        run(&env, "(+ 1").unwrap_err(),
        Error::SyntaxError(e) if e.kind == SyntaxErrorKind::UnexpectedEnd
    ));
}

#[test]
fn rules_over_host_records() {
    let (env, order) = order_env();

    let rule = r#"
        (let total (get order "Total")
             discounted (if (> total 100) (* total 0.9) total)
          (if (= (get order "Status") "open")
              (get (set order "Total" discounted "Coupon" "BULK10") "Total")
              total))
    "#;
    assert_eq!(run(&env, rule).unwrap(), "135.0");
    assert_eq!(order.get("Total").unwrap(), Value::from(BigDecimal::from(135)));
    assert_eq!(order.get("Coupon").unwrap(), Value::from("BULK10"));
    assert_eq!(run(&env, "order").unwrap(), "#<record:Order>");

    // A failed set leaves every field as it was
    let err = run(&env, "(set order \"Status\" \"closed\" \"Total\" \"lots\")").unwrap_err();
    assert_eq!(
        err,
        Error::HostCapabilityError("expected number, got string".into())
    );
    assert_eq!(order.get("Status").unwrap(), Value::from("open"));

    assert!(matches!(
        run(&env, "(get order \"Weight\")").unwrap_err(),
        Error::HostCapabilityError(_)
    ));
}

#[test]
fn host_functions() {
    fn concat(a: &str, b: &str) -> String {
        format!("{a}{b}")
    }

    let mut env = create_global_env();
    env.register_builtin_operation::<_, (&str, &str), String>("concat", concat);
    env.register_builtin_function("count", |args| Ok(Value::from(args.len() as u64)));

    assert_eq!(
        run(&env, "(concat \"rule\" (concat \"-\" \"engine\"))").unwrap(),
        "\"rule-engine\""
    );
    assert_eq!(run(&env, "(count 1 nil \"x\" ())").unwrap(), "4");
    assert_eq!(
        run(&env, "(concat \"a\")").unwrap_err(),
        Error::arity_error("concat", Arity::Exact(2), 1)
    );
    assert_eq!(
        run(&env, "(concat \"a\" 1)").unwrap_err(),
        Error::TypeError("expected string, got number\n  while evaluating: (concat \"a\" 1)".into())
    );
}

#[test]
fn panics_become_abnormal_termination() {
    let mut env = create_global_env();
    env.register_builtin_function("fail-hard", |_| panic!("ledger unavailable"));

    let err = run(&env, "(if true (fail-hard) 0)").unwrap_err();
    assert_eq!(
        err,
        Error::AbnormalTermination {
            operation: "eval".into(),
            message: "ledger unavailable".into(),
        }
    );
}

#[test]
fn short_circuit_evaluation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut env = create_global_env();
    env.register_builtin_function("touch", move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(args.first().cloned().unwrap_or(Value::Nil))
    });

    let cases = [
        ("(and (touch false) (touch true))", "false", 1),
        ("(or (touch 1) (touch 2))", "1", 1),
        ("(or (touch nil) (touch false) (touch 3))", "3", 3),
        ("(and (touch 1) (touch 2) (touch nil) (touch 4))", "nil", 3),
        ("(do (touch 1) (touch 2))", "2", 2),
        ("(if (touch true) 1 (touch 2))", "1", 1),
    ];

    for (input, expected, expected_calls) in cases {
        calls.store(0, Ordering::SeqCst);
        assert_eq!(run(&env, input).unwrap(), expected, "{input}");
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls, "{input}");
    }
}

/// `count` returns its first argument (or nil) and counts its calls. It is
/// bound in a host scope frame rather than in the environment.
fn counting_scope() -> (Scope, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut env = create_global_env();
    env.register_builtin_function("count", move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(args.first().cloned().unwrap_or(Value::Nil))
    });
    let count = env.get("count").cloned().unwrap();

    let scope = Scope::from_frames([Frame::from([("count".to_owned(), count)])]);
    (scope, calls)
}

#[test]
fn lazy_forms_count_their_calls() {
    let env = create_global_env();
    let (scope, calls) = counting_scope();

    let cases = [
        ("(and (count true) (count 3) (count false) false)", Value::Bool(false), 3),
        ("(or false nil (count) (count true))", Value::Bool(true), 2),
        ("(do (count) (count) false (count))", Value::Nil, 3),
    ];

    for (input, expected, expected_calls) in cases {
        calls.store(0, Ordering::SeqCst);
        let expr = read_fully(input).unwrap();
        assert_eq!(eval(&env, &scope, &expr).unwrap(), expected, "{input}");
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls, "{input}");
    }
}

#[test]
fn arithmetic_identities_and_shadowing() {
    let env = create_global_env();
    let quotient = BigDecimal::from(1) / BigDecimal::from(2) / BigDecimal::from(3);

    let cases = [
        ("(/ 1 2 3)", Value::Number(quotient)),
        ("(+)", Value::from(0)),
        ("(*)", Value::from(1)),
        ("(- 1)", Value::from(-1)),
        ("(let a 1 a 0 a)", Value::from(0)),
        ("(let a 1 (let a 0 a))", Value::from(0)),
    ];

    for (input, expected) in cases {
        let expr = read_fully(input).unwrap();
        assert_eq!(eval(&env, &Scope::new(), &expr).unwrap(), expected, "{input}");
    }
}

#[test]
fn host_scopes_and_custom_special_forms() {
    let mut env = create_global_env();
    env.register_special_form("when", |env, scope, args| {
        let [condition, body @ ..] = args else {
            return Err(Error::arity_error("when", Arity::AtLeast(1), 0));
        };
        if rulexpr::eval_subform(env, scope, condition)?.is_truthy() {
            body.iter()
                .try_fold(Value::Nil, |_, expr| rulexpr::eval_subform(env, scope, expr))
        } else {
            Ok(Value::Nil)
        }
    });

    let scope = Scope::from_frames([Frame::from([
        ("threshold".to_owned(), Value::from(10)),
        ("score".to_owned(), Value::from(12)),
    ])]);

    let expr = read_fully("(when (> score threshold) \"pass\")").unwrap();
    assert_eq!(eval(&env, &scope, &expr).unwrap(), Value::from("pass"));

    let expr = read_fully("(let score 3 (when (> score threshold) \"pass\"))").unwrap();
    assert_eq!(eval(&env, &scope, &expr).unwrap(), Value::Nil);

    assert_eq!(
        eval(&env, &scope, &read_fully("(when)").unwrap()).unwrap_err(),
        Error::arity_error("when", Arity::AtLeast(1), 0)
    );
}

#[test]
fn reading_a_sequence_of_forms() {
    let text = "(+ 1 2) (* 3 4)\n\"done\"";
    let env = create_global_env();

    let mut start = 0;
    let mut results = Vec::new();
    while let Ok((expr, next)) = read(text, start) {
        results.push(print(&eval(&env, &Scope::new(), &expr).unwrap()));
        start = next;
    }
    assert_eq!(results, ["3", "12", "\"done\""]);
}

#[test]
fn traverse_lists_visits_every_list() {
    let expr = read_fully("(+ (a (b) c ()))").unwrap();

    let mut lengths = Vec::new();
    traverse_lists::<()>(&expr, &mut |list: &[Value]| {
        lengths.push(list.len());
        Ok(())
    })
    .unwrap();
    assert_eq!(lengths, [2, 4, 1, 0]);

    // A visitor error stops the walk
    let mut seen = 0;
    let result = traverse_lists(&expr, &mut |list: &[Value]| {
        seen += 1;
        if list.is_empty() { Err("empty list") } else { Ok(()) }
    });
    assert_eq!(result, Err("empty list"));
    assert_eq!(seen, 4);
}

#[test]
fn print_round_trips_canonical_text() {
    for input in [
        "(let a 2 (+ 1 a))",
        "(if (> (get order \"Total\") 100) \"big\" nil)",
        "-0.0001",
        "123456789012345678901234567890.123456789",
    ] {
        assert_eq!(print(&read_fully(input).unwrap()), input);
    }
}
