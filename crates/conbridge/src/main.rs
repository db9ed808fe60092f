mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "conbridge", version, about = "Console bridge over named pipes")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "conbridge",
            "send",
            "--name",
            "console",
            "changelevel",
            "gm_flatgrass",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.endpoint.name, "console");
        assert_eq!(args.command, vec!["changelevel", "gm_flatgrass"]);
    }

    #[test]
    fn send_requires_a_command() {
        let err = Cli::try_parse_from(["conbridge", "send"])
            .expect_err("missing command should fail");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn parses_tail_with_count_and_dir() {
        let cli = Cli::try_parse_from([
            "conbridge",
            "--format",
            "raw",
            "tail",
            "--dir",
            "/var/run/game",
            "--count",
            "3",
        ])
        .expect("tail args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Raw)));
        let Command::Tail(args) = cli.command else {
            panic!("expected tail");
        };
        assert_eq!(args.count, Some(3));
        assert_eq!(args.endpoint.dir, PathBuf::from("/var/run/game"));
    }

    #[test]
    fn parses_serve_overflow_policy() {
        let cli = Cli::try_parse_from(["conbridge", "serve", "--overflow", "disconnect"])
            .expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert!(matches!(args.overflow, cmd::OverflowArg::Disconnect));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = Cli::try_parse_from(["conbridge", "--log-level", "loud", "version"])
            .expect_err("bad level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
