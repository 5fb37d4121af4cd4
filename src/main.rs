mod disclosure;
mod export;
mod llm;
mod parser;
mod preferences;
mod record;
mod runner;
mod session;
mod state;
mod thread;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use session::Session;
use std::io::{self, Read, Write};
use std::process;
use tracing_subscriber::EnvFilter;
use types::{HostCommand, HostOutput};

/// Explains runtime errors line by line: hint first, answer last.
#[derive(Debug, Parser)]
#[command(name = "tracehint", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Handle one host command read as JSON from stdin (the default).
    Hook,
    /// Run a script and print updated decorations, one JSON line per
    /// traceback location, until it exits.
    Watch {
        /// Script to run.
        file: String,
        #[arg(long, default_value = ".")]
        cwd: String,
        #[arg(long)]
        session_id: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("TRACEHINT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Handle one host command. Exports are written only after the output has
/// been flushed to the host.
fn hook() -> Result<()> {
    let input = read_stdin().context("reading stdin")?;
    let command: HostCommand = serde_json::from_str(&input).context("parsing host command")?;
    let common = command.common();
    let mut session = Session::open(&common.cwd, &common.session_id)?;
    if let Some(output) = session.handle(&command)? {
        print_output(&output)?;
    }
    session.write_exports();
    Ok(())
}

fn print_output(output: &HostOutput) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{}",
        serde_json::to_string(output).context("serializing output")?
    )?;
    out.flush()?;
    Ok(())
}

fn watch(file: &str, cwd: &str, session_id: &str) -> Result<()> {
    let mut session = Session::open(cwd, session_id)?;
    session.watch(file, print_output)
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(CliCommand::Hook) {
        CliCommand::Hook => hook(),
        CliCommand::Watch {
            file,
            cwd,
            session_id,
        } => watch(&file, &cwd, &session_id),
    };

    if let Err(err) = result {
        eprintln!("tracehint: {err:#}");
        process::exit(2);
    }
}
