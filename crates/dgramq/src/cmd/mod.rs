use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run senders, a packet assembler and receivers over a loopback queue pair.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of application threads submitting datagrams.
    #[arg(long, default_value = "1")]
    pub senders: usize,
    /// Total number of datagrams to submit (split across senders).
    #[arg(long, short = 'n', default_value = "1000")]
    pub messages: usize,
    /// Number of application threads receiving datagrams.
    #[arg(long, default_value = "1")]
    pub receivers: usize,
    /// Receive buffer capacity of the receiving queue.
    #[arg(long, default_value_t = dgramq_core::DEFAULT_RECEIVE_CAPACITY)]
    pub capacity: usize,
    /// Payload size in bytes (minimum 8).
    #[arg(long, default_value = "64")]
    pub payload_size: usize,
    /// Expire datagrams not picked up within this time (e.g. 5s, 500ms).
    #[arg(long)]
    pub send_timeout: Option<String>,
    /// Assembler pause before each send attempt (e.g. 1ms).
    #[arg(long)]
    pub pack_delay: Option<String>,
    /// Receiver pause after each datagram, to provoke drops (e.g. 1ms).
    #[arg(long)]
    pub receive_delay: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show enabled features and target.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn parse_optional_duration(input: Option<&str>) -> CliResult<Option<Duration>> {
    input.map(parse_duration).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn optional_duration_passes_none_through() {
        assert_eq!(parse_optional_duration(None).unwrap(), None);
        assert_eq!(
            parse_optional_duration(Some("5ms")).unwrap(),
            Some(Duration::from_millis(5))
        );
    }
}
