//! Run a Rhai script with the math host API installed.
//!
//! Usage:
//!   scriptbridge demos/vector_demo.rhai
//!   scriptbridge demos/vector_demo.rhai --call calculate_fibonacci 10
//!   scriptbridge script.rhai --seed 42 -vv

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use scriptbridge::{BridgeConfig, BridgeError, NativeValue, Session, SessionState};
use scriptbridge_math::MathApi;
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "scriptbridge")]
#[command(about = "Run a Rhai script against native math types", long_about = None)]
/// Command line options.
struct Cli {
    /// Script to run
    file: PathBuf,

    /// Script function to call after the script has run
    #[arg(long, value_name = "NAME")]
    call: Option<String>,

    /// Arguments for --call: numbers, true/false, null, or strings
    #[arg(requires = "call", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Seed for math::random
    #[arg(long)]
    seed: Option<u64>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_arg(raw: &str) -> NativeValue {
    match raw {
        "true" => NativeValue::Boolean(true),
        "false" => NativeValue::Boolean(false),
        "null" => NativeValue::Null,
        _ => raw
            .parse::<f64>()
            .map(NativeValue::Number)
            .unwrap_or_else(|_| NativeValue::from(raw)),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: &Cli, session: &mut Session) -> Result<Option<NativeValue>, BridgeError> {
    session.initialize()?;
    session.install(&MathApi)?;
    let result = session.run_file(&cli.file);
    for line in session.take_output() {
        println!("{line}");
    }
    result?;

    let Some(name) = &cli.call else {
        return Ok(None);
    };
    let args: Vec<NativeValue> = cli.args.iter().map(|a| parse_arg(a)).collect();
    debug!(name, ?args, "calling script function");
    let value = session.call_script_function(name, &args)?;
    for line in session.take_output() {
        println!("{line}");
    }
    Ok(Some(value))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut session = Session::new(BridgeConfig {
        rng_seed: cli.seed,
        ..BridgeConfig::default()
    });

    let outcome = run(&cli, &mut session);
    if let Ok(Some(value)) = &outcome {
        let rendered = match value {
            NativeValue::Object(handle) => session
                .object_type_name(*handle)
                .map(|name| format!("<{name} {handle}>"))
                .unwrap_or_else(|_| value.to_string()),
            _ => serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
        };
        println!("{rendered}");
    }
    if session.state() == SessionState::Ready
        && let Err(e) = session.teardown()
    {
        eprintln!("teardown failed: {e}");
    }

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let info = e.info();
            match info.location {
                Some(location) => eprintln!("{} ({location})", info.message),
                None => eprintln!("{}", info.message),
            }
            ExitCode::FAILURE
        }
    }
}
