use rulexpr::json::JsonRecord;
use rulexpr::{Environment, HostRef, Scope, Value, create_global_env, eval, read_fully};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn concat(a: &str, b: &str) -> String {
    format!("{a}{b}")
}

/// Environment with a sample record and a host function to play with
fn demo_env() -> Environment {
    let mut env = create_global_env();
    env.register_builtin_operation::<_, (&str, &str), String>("concat", concat);

    let order = serde_json::json!({
        "Id": "A-1001",
        "Total": 129.90,
        "Status": "open",
        "Customer": {"Name": "Ada", "Vip": true},
        "Lines": [49.95, 79.95]
    });
    match JsonRecord::from_json(&order) {
        Ok(record) => env.define("order", HostRef::new(record)),
        Err(err) => eprintln!("Could not load the sample order: {err}"),
    }

    env
}

fn run_repl() {
    println!("RuleXpr expression evaluator");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("A sample record is bound to `order`: (get order \"Total\")");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let env = demo_env();

    loop {
        match rl.readline("rulexpr> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let result = read_fully(line).and_then(|expr| eval(&env, &Scope::new(), &expr));
                match result {
                    Ok(value) => println!("{value}"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Language:");
    println!("  Numbers: 42, -5, 0.1 (exact decimals)");
    println!("  Strings: \"text\"   Constants: true, false, nil");
    println!("  Arithmetic: +, -, *, /");
    println!("  Comparison: =, not=, <, >, <=, >=, compare");
    println!("  Logic: and, or, not, if, do");
    println!("  Bindings: (let name expr ... body)");
    println!("  Records: (get record \"Field\"), (set record \"Field\" value ...)");
    println!();
    println!("Examples:");
    println!("  (let rate 0.2 (* (get order \"Total\") rate))");
    println!("  (if (get (get order \"Customer\") \"Vip\") \"priority\" \"normal\")");
    println!("  (concat \"order \" (get order \"Id\"))");
    println!();
    println!("Set RUST_LOG=rulexpr=trace to see evaluation traces.");
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let mut callables = Vec::new();
    let mut values = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Callable { .. } => callables.push(name),
            _ => values.push((name, value)),
        }
    }

    if !callables.is_empty() {
        println!("Functions and special forms ({}):", callables.len());
        // Print in columns for readability
        let mut col = 0;
        for name in callables {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}
