use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use isolink_field::FieldEncoding;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod codec;
pub mod echo;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an adaptor: JSON message lines on stdin go out, received messages are printed.
    Run(RunArgs),
    /// Accept NAC connections and echo every message back.
    Echo(EchoArgs),
    /// Encode a hex value with a single field codec.
    Pack(CodecArgs),
    /// Decode a hex value with a single field codec.
    Unpack(CodecArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Echo(args) => echo::run(args),
        Command::Pack(args) => codec::pack(args, format),
        Command::Unpack(args) => codec::unpack(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Adaptor configuration file (JSON).
    pub config: PathBuf,
    /// Read message lines from this file instead of stdin.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
    /// Exit after printing N received messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 0.0.0.0:8000).
    pub addr: String,
    /// Packager configuration file (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
    /// Packed-decimal header digits expected on every frame (e.g. 6000010000).
    #[arg(long)]
    pub header: Option<String>,
    /// Echo TPDU headers unchanged.
    #[arg(long)]
    pub no_swap: bool,
    /// Exit after serving N sessions.
    #[arg(long)]
    pub sessions: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    FixedHex,
    LllBinary,
}

impl From<EncodingArg> for FieldEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::FixedHex => FieldEncoding::FixedHex,
            EncodingArg::LllBinary => FieldEncoding::LllBinary,
        }
    }
}

#[derive(Args, Debug)]
pub struct CodecArgs {
    /// Value as hex.
    pub value: String,
    /// Field encoding.
    #[arg(long, short = 'e', value_enum)]
    pub encoding: EncodingArg,
    /// Fixed length or maximum length in bytes.
    #[arg(long, short = 'l')]
    pub length: usize,
    /// Field number used in error messages.
    #[arg(long, default_value = "2")]
    pub field: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
