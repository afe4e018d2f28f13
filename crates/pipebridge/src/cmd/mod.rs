use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod probe;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay a local IPC channel onto an ephemeral loopback TCP port.
    Serve(ServeArgs),
    /// Check that a channel path is usable before serving it.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Channel path to bridge (e.g. /var/run/docker.sock).
    #[arg(env = "PIPEBRIDGE_CHANNEL")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Channel path to check.
    #[arg(env = "PIPEBRIDGE_CHANNEL")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
