use std::io::Read;
use std::process;

use anyhow::Context;
use pageant::{KeyAgent, PageantError};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Status,
    List { json: bool },
    LoadCert { source: String },
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let command = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: pageant-bridge <command>");
            eprintln!();
            eprintln!("Commands:");
            eprintln!("  status             Report whether Pageant is running");
            eprintln!("  list [--json]      List the keys Pageant can sign with");
            eprintln!("  load-cert <file>   Load an OpenSSH certificate ('-' reads stdin)");
            eprintln!();
            eprintln!("Environment:");
            eprintln!("  PAGEANT_WINDOW           Agent window class/title [default: Pageant]");
            eprintln!("  PAGEANT_SEND_TIMEOUT_MS  Bound the wait for the agent [default: none]");
            eprintln!("  PAGEANT_LOG              debug|info|warn|error [default: info]");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(command, pageant::native_agent().as_ref()) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut rest = args.iter().skip(1).map(String::as_str); // skip argv[0]

    let mut command = match rest.next() {
        Some("status") => Command::Status,
        Some("list") => Command::List { json: false },
        Some("load-cert") => Command::LoadCert {
            source: rest
                .next()
                .ok_or("load-cert requires a file argument")?
                .to_string(),
        },
        Some("--help" | "-h") => return Err(String::new()),
        Some(other) => return Err(format!("unknown command: {other}")),
        None => return Err("missing command".to_string()),
    };

    for arg in rest {
        match (&mut command, arg) {
            (Command::List { json }, "--json") => *json = true,
            (_, "--help" | "-h") => return Err(String::new()),
            (_, arg) if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            (_, arg) => return Err(format!("unexpected argument: {arg}")),
        }
    }
    Ok(command)
}

fn run(command: Command, agent: &dyn KeyAgent) -> anyhow::Result<()> {
    match command {
        Command::Status => {
            if agent.is_available() {
                println!("pageant: running");
            } else {
                tracing::warn!("Pageant is not running");
                println!("pageant: not running");
            }
            Ok(())
        }
        Command::List { json } => {
            let keys = match agent.list_signable_keys() {
                Ok(keys) => keys,
                Err(e) if e.is_agent_unavailable() => {
                    tracing::warn!("Pageant is not running; no keys to list");
                    Vec::new()
                }
                Err(e) => return Err(e).context("listing keys"),
            };
            if keys.is_empty() {
                tracing::warn!("No signable keys loaded in Pageant");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                for key in &keys {
                    let fingerprint = key.fingerprint.as_deref().unwrap_or("-");
                    println!("{} {} {}", key.algorithm, fingerprint, key.comment);
                }
            }
            Ok(())
        }
        Command::LoadCert { source } => {
            let line = read_source(&source)?;
            agent
                .load_certificate(&line)
                .with_context(|| format!("loading certificate from {source}"))?;
            println!("certificate loaded");
            Ok(())
        }
    }
}

fn read_source(source: &str) -> anyhow::Result<String> {
    let contents = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading certificate from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };

    // Certificate files hold one line; ignore anything after it.
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PageantError::InvalidCertificateLine.into())
}

/// Level for our own targets when `RUST_LOG` is unset.
fn pageant_log_level(value: Option<&str>) -> &'static str {
    match value {
        Some("debug") => "debug",
        Some("warn" | "warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

/// Logs go to stderr so stdout stays clean for `list --json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = pageant_log_level(std::env::var("PAGEANT_LOG").ok().as_deref());
        EnvFilter::new(format!("pageant={level},pageant_bridge={level}"))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
