use std::path::PathBuf;

use clap::ArgAction;
use clap::Args as Arguments;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;


/// A command line interface for tracecore.
///
/// Events are read from a line oriented text file. Supported lines are:
///
///   kernel <start> <end> <name> [build-id]
///   mmap <upid> <start> <end> <offset> <name> [build-id]
///   jitcache <upid> <start> <end> <name>
///   jit <upid> <start> <end> <function>
///   frame <upid|kernel> <addr> [function]
///
/// Addresses and offsets are hexadecimal, with or without 0x prefix.
/// Empty lines and lines starting with '#' are ignored.
#[derive(Debug, Parser)]
#[clap(version = env!("VERSION"), verbatim_doc_comment)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the frames interned from an event file.
    Frames(Frames),
    /// Print the mappings registered from an event file.
    Mappings(Mappings),
}


/// The column to order frames by.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FrameOrder {
    Id,
    Name,
    Mapping,
    RelPc,
}

impl FrameOrder {
    /// Retrieve the name of the column in the frame table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Mapping => "mapping",
            Self::RelPc => "rel_pc",
        }
    }
}


#[derive(Debug, Arguments)]
pub struct Frames {
    /// The path to the event file.
    pub path: PathBuf,
    /// Only report frames in the mapping with this id.
    #[clap(short, long)]
    pub mapping: Option<u32>,
    /// Only report frames whose name matches this glob pattern.
    #[clap(short, long)]
    pub name: Option<String>,
    /// The column to order frames by.
    #[clap(long, value_enum)]
    pub order_by: Option<FrameOrder>,
    /// Order in descending order.
    #[clap(long, requires = "order_by")]
    pub desc: bool,
}


#[derive(Debug, Arguments)]
pub struct Mappings {
    /// The path to the event file.
    pub path: PathBuf,
    /// Only report mappings whose name matches this glob pattern.
    #[clap(short, long)]
    pub name: Option<String>,
}
