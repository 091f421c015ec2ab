use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use busplot_frame::PidArgument;
use busplot_transport::{DataBits, FlowControl, Parity, StopBits};
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod link;
pub mod listen;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive from a device and print decoded messages.
    Listen(ListenArgs),
    /// Decode a captured byte stream from a file.
    Decode(DecodeArgs),
    /// Encode one message as a frame.
    Encode(EncodeArgs),
    /// Act as a device: send aliases then a stream of sine/cosine values.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the byte stream comes from and how the serial line is set up.
#[derive(Args, Debug, Default)]
pub struct LinkArgs {
    /// Serial device path, e.g. /dev/ttyUSB0.
    #[arg(env = "BUSPLOT_DEVICE", required_unless_present_any = ["socket", "config"])]
    pub device: Option<PathBuf>,
    /// Connect to a Unix socket instead of a serial device.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    /// JSON file with serial settings; flags override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Line speed in bits per second.
    #[arg(long, env = "BUSPLOT_BAUD")]
    pub baud: Option<u32>,
    /// Character size (5-8).
    #[arg(long, value_name = "BITS")]
    pub data_bits: Option<DataBits>,
    /// Parity (none, odd, even).
    #[arg(long)]
    pub parity: Option<Parity>,
    /// Stop bits (1, 2).
    #[arg(long)]
    pub stop_bits: Option<StopBits>,
    /// Flow control (none, hardware, software).
    #[arg(long)]
    pub flow_control: Option<FlowControl>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit with a timeout error if no message arrives for this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file holding raw bytes from the line.
    pub file: PathBuf,
    /// Also print a per-variable series summary.
    #[arg(long)]
    pub series: bool,
    /// Fail if any frame had to be discarded.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Write the raw frame to a file instead of only printing it.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
    /// Append to --out instead of truncating it.
    #[arg(long, requires = "out")]
    pub append: bool,
    /// Prefix the frame with N bytes of line noise.
    #[arg(long, value_name = "N", default_value = "0")]
    pub garbage: usize,
    #[command(subcommand)]
    pub message: EncodeMessage,
}

#[derive(Subcommand, Debug)]
pub enum EncodeMessage {
    /// Assign a display alias to a variable.
    Alias { variable_id: u16, alias: String },
    /// Send a new value for a variable.
    Update {
        variable_id: u16,
        #[arg(allow_negative_numbers = true)]
        value: f32,
    },
    /// Stop tracking a variable.
    Remove { variable_id: u16 },
    /// Apply PID parameters, each given as SCALE,OUT_MAX,VALUE.
    Apply {
        #[arg(long, value_parser = parse_pid, allow_hyphen_values = true)]
        p: PidArgument,
        #[arg(long, value_parser = parse_pid, allow_hyphen_values = true)]
        i: PidArgument,
        #[arg(long, value_parser = parse_pid, allow_hyphen_values = true)]
        d: PidArgument,
    },
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Delay between value updates.
    #[arg(long, value_name = "MS", default_value = "1")]
    pub interval_ms: u64,
    /// Stop after N update rounds.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_pid(input: &str) -> Result<PidArgument, String> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    let [scale, out_max, value] = parts.as_slice() else {
        return Err(format!("expected SCALE,OUT_MAX,VALUE, got {input:?}"));
    };
    Ok(PidArgument::new(
        parse_num(scale)?,
        parse_num(out_max)?,
        parse_num(value)?,
    ))
}

fn parse_num(s: &str) -> Result<f32, String> {
    s.parse()
        .map_err(|err| format!("invalid number {s:?}: {err}"))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pid_reads_three_terms() {
        let pid = parse_pid("1.5, 100, -0.25").unwrap();
        assert_eq!(pid, PidArgument::new(1.5, 100.0, -0.25));
    }

    #[test]
    fn parse_pid_rejects_wrong_arity_and_text() {
        assert!(parse_pid("1,2").is_err());
        assert!(parse_pid("1,2,3,4").is_err());
        assert!(parse_pid("1,x,3").unwrap_err().contains("invalid number"));
    }
}
