use anyhow::Result;
use clap::{ArgAction, Parser};
use musai_tokenizer::cli::{run_tokenize, TokenizeArgs};

#[derive(Parser, Debug)]
#[command(name = "tokenizer")]
#[command(about = "Convert a MIDI collection to REMI/MMM token corpora", long_about = None)]
struct Cli {
    #[command(flatten)]
    args: TokenizeArgs,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Less logging (-q warnings, -qq errors only)
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    musai_core::init_logging(cli.verbose, cli.quiet);
    run_tokenize(&cli.args)
}
