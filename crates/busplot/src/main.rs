mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "busplot", version, about = "Serial RPC link tool")]
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
    match cmd::run(cli.command, format) {
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
    use crate::cmd::EncodeMessage;

    #[test]
    fn parses_listen_with_serial_flags() {
        let cli = Cli::try_parse_from([
            "busplot",
            "listen",
            "/dev/ttyUSB0",
            "--baud",
            "57600",
            "--parity",
            "even",
            "--stop-bits",
            "2",
            "--count",
            "10",
        ])
        .expect("listen args should parse");

        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.link.baud, Some(57_600));
        assert_eq!(args.count, Some(10));
        let config = args.link.serial_config().expect("settings should be valid");
        assert_eq!(config.parity, busplot_transport::Parity::Even);
        assert_eq!(config.stop_bits, busplot_transport::StopBits::Two);
    }

    #[test]
    fn listen_requires_a_link() {
        let err = Cli::try_parse_from(["busplot", "listen"]).expect_err("missing device");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn socket_replaces_device() {
        let cli = Cli::try_parse_from(["busplot", "simulate", "--socket", "/tmp/dev.sock"])
            .expect("socket alone should parse");
        assert!(matches!(cli.command, Command::Simulate(_)));
    }

    #[test]
    fn rejects_bad_line_settings() {
        let err = Cli::try_parse_from(["busplot", "listen", "/dev/ttyS0", "--data-bits", "9"])
            .expect_err("9 data bits should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_encode_with_negative_value() {
        let cli = Cli::try_parse_from(["busplot", "encode", "--garbage", "2", "update", "7", "-1.5"])
            .expect("encode args should parse");
        let Command::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.garbage, 2);
        assert!(matches!(
            args.message,
            EncodeMessage::Update {
                variable_id: 7,
                value
            } if value == -1.5
        ));
    }

    #[test]
    fn append_requires_out() {
        let err = Cli::try_parse_from(["busplot", "encode", "--append", "remove", "1"])
            .expect_err("--append alone should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
