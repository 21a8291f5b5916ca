mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "wsrpc", version, about = "Bidirectional RPC over WebSocket")]
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

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format).await;

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
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "wsrpc",
            "call",
            "ws://127.0.0.1:9000",
            "Calculator.add",
            "--args",
            "[5, 3]",
        ])
        .expect("call args should parse");

        assert!(matches!(cli.command, Command::Call(_)));
    }

    #[test]
    fn rejects_conflicting_argument_forms() {
        let err = Cli::try_parse_from([
            "wsrpc",
            "call",
            "ws://127.0.0.1:9000",
            "Calculator.add",
            "--args",
            "[5]",
            "--arg",
            "3",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_serve_with_default_addr() {
        let cli = Cli::try_parse_from(["wsrpc", "serve"]).expect("serve args should parse");
        match cli.command {
            Command::Serve(args) => assert_eq!(args.addr, "127.0.0.1:9000"),
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn parses_introspect_with_timeout() {
        let cli =
            Cli::try_parse_from(["wsrpc", "introspect", "ws://127.0.0.1:9000", "--timeout", "3s"])
                .expect("introspect args should parse");
        assert!(matches!(cli.command, Command::Introspect(_)));
    }
}
