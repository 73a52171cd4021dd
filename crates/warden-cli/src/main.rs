//! warden command-line driver.
//!
//! Reads a textual IR module (`.ll`), optionally inlines functions and
//! globals, instruments the default checks, runs bounded model
//! checking with the built-in oracle, and reports one of the fixed
//! result lines:
//!
//! ```text
//! Verification SUCCESSFUL.
//! Verification FAILED.
//! Verification BOUND REACHED
//! Verification TIMEOUT
//! Verification UNKNOWN
//! Verification INTERNAL ERROR.
//! ```
//!
//! Exit code 0 covers every verdict (a found bug is a successful run);
//! exit code 1 is reserved for input and driver errors.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use warden_check::bmc::{check_module, BmcSettings};
use warden_check::checks::CheckRegistry;
use warden_check::memory::MemoryModelKind;
use warden_check::solver::PropagationOracle;
use warden_check::trace::{Trace, TraceValue};
use warden_check::translate::TranslateSettings;
use warden_check::Verdict;

/// Bounded software verification for LLVM-style IR.
#[derive(Parser)]
#[command(name = "warden", about = "Bounded software verification frontend")]
struct Cli {
    /// Input module (.ll assembly; .bc requires the external frontend).
    input: PathBuf,

    /// Maximum number of blocks explored on one path.
    #[arg(long, default_value_t = 100)]
    bound: usize,

    /// Memory model: simple | flat.
    #[arg(long, default_value = "simple")]
    memory: String,

    /// Print the instrumented module before verification.
    #[arg(long)]
    show_final_cfg: bool,

    /// Model integers as mathematical integers instead of bitvectors.
    #[arg(long)]
    math_int: bool,

    /// Assume floating-point values are never NaN.
    #[arg(long)]
    assume_no_nan: bool,

    /// Inline calls to defined functions into main.
    #[arg(long)]
    inline: bool,

    /// Rewrite module globals into main-local storage.
    #[arg(long)]
    inline_globals: bool,

    /// Print the counterexample trace on a FAILED verdict.
    #[arg(long)]
    trace: bool,

    /// Write a C test harness reproducing the counterexample.
    #[arg(long)]
    test_harness: Option<PathBuf>,

    /// Print the verdict as JSON in addition to the result line.
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let memory: MemoryModelKind = match cli.memory.parse() {
        Ok(kind) => kind,
        Err(message) => {
            eprintln!("ERROR: {message}");
            return 1;
        }
    };

    let mut module = match load_module(&cli.input) {
        Ok(module) => module,
        Err(message) => {
            eprintln!("ERROR: {message}");
            return 1;
        }
    };

    if !module.functions.contains_key("main") {
        eprintln!("ERROR: No 'main' function found.");
        return 1;
    }

    if cli.inline {
        if let Err(err) = warden_ir::inline_functions(&mut module) {
            eprintln!("ERROR: {err}");
            return 1;
        }
    }
    if cli.inline_globals {
        warden_ir::inline_globals(&mut module);
    }

    let registry = CheckRegistry::with_default_checks();
    registry.run(&mut module);

    if cli.show_final_cfg {
        print!("{module}");
    }

    let settings = BmcSettings {
        bound: cli.bound,
        memory,
        translate: TranslateSettings {
            math_int: cli.math_int,
            assume_no_nan: cli.assume_no_nan,
        },
    };
    let mut oracle = PropagationOracle::new();
    let verdict = check_module(&module, &mut oracle, &settings);

    report(cli, &registry, &verdict);

    if cli.json {
        match serde_json::to_string_pretty(&verdict) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("ERROR: could not serialize verdict: {err}"),
        }
    }
    0
}

fn load_module(input: &Path) -> Result<warden_ir::Module, String> {
    match input.extension().and_then(|e| e.to_str()) {
        Some("ll") => {
            let source = std::fs::read_to_string(input)
                .map_err(|err| format!("cannot read '{}': {err}", input.display()))?;
            warden_ir::parse_module(&source)
                .map_err(|err| format!("{}: {err}", input.display()))
        }
        Some("bc") => Err(format!(
            "'{}': LLVM bitcode input requires the external bitcode frontend; \
             supply textual assembly (.ll) instead.",
            input.display()
        )),
        _ => Err(format!(
            "'{}': input file must be in LLVM bitcode (.bc) or LLVM assembly (.ll) format.",
            input.display()
        )),
    }
}

fn report(cli: &Cli, registry: &CheckRegistry, verdict: &Verdict) {
    match verdict {
        Verdict::Success => println!("Verification SUCCESSFUL."),
        Verdict::Fail { code, trace } => {
            println!("Verification FAILED.");
            println!("  {}", registry.message_for_code(*code));
            if cli.trace {
                println!("Error trace:");
                println!("------------");
                match trace {
                    Some(trace) => {
                        for event in &trace.events {
                            println!("  {event}");
                        }
                    }
                    None => println!("Error trace is unavailable."),
                }
            }
            if let Some(path) = &cli.test_harness {
                match trace {
                    Some(trace) => match std::fs::write(path, render_harness(trace)) {
                        Ok(()) => println!("Test harness written to {}.", path.display()),
                        Err(err) => eprintln!(
                            "ERROR: cannot write test harness '{}': {err}",
                            path.display()
                        ),
                    },
                    None => eprintln!(
                        "ERROR: no trace available, test harness was not generated."
                    ),
                }
            }
        }
        Verdict::BoundReached => println!("Verification BOUND REACHED"),
        Verdict::Timeout => println!("Verification TIMEOUT"),
        Verdict::Unknown => println!("Verification UNKNOWN"),
        Verdict::InternalError(message) => {
            println!("Verification INTERNAL ERROR.");
            println!("  {message}");
        }
    }
}

/// Renders a C harness defining the nondet producers to replay the
/// counterexample's input sequence.
fn render_harness(trace: &Trace) -> String {
    let mut by_function: Vec<(String, Vec<&TraceValue>)> = Vec::new();
    for input in &trace.inputs {
        match by_function.iter_mut().find(|(name, _)| *name == input.function) {
            Some((_, values)) => values.push(&input.value),
            None => by_function.push((input.function.clone(), vec![&input.value])),
        }
    }

    let mut out = String::new();
    out.push_str("/* Test harness generated from a verification counterexample. */\n\n");
    for (function, values) in &by_function {
        let c_type = harness_c_type(function);
        let mut rendered = Vec::with_capacity(values.len());
        for value in values {
            rendered.push(match value {
                TraceValue::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
                TraceValue::Int(v) => v.to_string(),
                TraceValue::Float(v) => format!("{v:?}"),
                TraceValue::Undefined => "0".to_string(),
            });
        }
        let _ = writeln!(
            out,
            "{c_type} {function}(void) {{\n    static {c_type} values[] = {{{}}};\n    \
             static unsigned next = 0;\n    return values[next++];\n}}\n",
            rendered.join(", ")
        );
    }
    out
}

/// C return type of a `__VERIFIER_nondet_*` producer, from its suffix.
fn harness_c_type(function: &str) -> &'static str {
    match function.rsplit('_').next() {
        Some("uint") => "unsigned int",
        Some("long") => "long",
        Some("ulong") => "unsigned long",
        Some("short") => "short",
        Some("ushort") => "unsigned short",
        Some("char") => "char",
        Some("uchar") => "unsigned char",
        Some("bool") => "int",
        Some("float") => "float",
        Some("double") => "double",
        _ => "int",
    }
}
