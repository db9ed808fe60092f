use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use conbridge_frame::{OverflowPolicy, DEFAULT_MAX_PENDING};
use conbridge_transport::{EndpointConfig, DEFAULT_ENDPOINT_NAME, DEFAULT_FIFO_DIR};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod tail;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host a bridge: stdin lines become log records, received commands are printed.
    Serve(ServeArgs),
    /// Attach to a bridge and print its log records.
    Tail(TailArgs),
    /// Send one console command to a bridge.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Tail(args) => tail::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Endpoint location shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Endpoint name (pipe name on Windows, FIFO base name elsewhere).
    #[arg(long, env = "CONBRIDGE_ENDPOINT", default_value = DEFAULT_ENDPOINT_NAME)]
    pub name: String,
    /// Directory holding the FIFOs (ignored on Windows).
    #[arg(long, env = "CONBRIDGE_DIR", default_value = DEFAULT_FIFO_DIR)]
    pub dir: PathBuf,
}

impl EndpointArgs {
    pub fn to_config(&self) -> EndpointConfig {
        EndpointConfig::named(self.name.clone()).with_dir(self.dir.clone())
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OverflowArg {
    /// Drop the oversized command and resynchronize.
    Discard,
    /// Drop the link and recreate the endpoint.
    Disconnect,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(value: OverflowArg) -> Self {
        match value {
            OverflowArg::Discard => OverflowPolicy::DiscardCommand,
            OverflowArg::Disconnect => OverflowPolicy::Disconnect,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// FIFO permission bits, octal (ignored on Windows).
    #[arg(long, value_parser = parse_mode, default_value = "600")]
    pub mode: u32,
    /// Channel name attached to records read from stdin.
    #[arg(long, default_value = "Console")]
    pub channel: String,
    /// Polling interval in milliseconds.
    #[arg(long, default_value = "50")]
    pub poll_ms: u64,
    /// Largest accepted command in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING)]
    pub max_command: usize,
    /// What to do with a command larger than --max-command.
    #[arg(long, value_enum, default_value = "discard")]
    pub overflow: OverflowArg,
    /// Exit after executing N commands.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Command words, joined with single spaces.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_mode(raw: &str) -> Result<u32, String> {
    let digits = raw.trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8).map_err(|err| format!("invalid octal mode: {err}"))?;
    if mode > 0o777 {
        return Err(format!("mode {raw} has bits outside 0o777"));
    }
    Ok(mode)
}
