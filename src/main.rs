use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use musai_tokenizer::cli::{run_detokenize, run_tokenize, DetokenizeArgs, TokenizeArgs};
use musai_trainer::cli::{run_train, TrainArgs};

#[derive(Parser)]
#[command(name = "musai")]
#[command(about = "MIDI tokenization and sequence-model training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Less logging (-q warnings, -qq errors only)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    quiet: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert MIDI files to a token corpus and/or learn BPE over it
    Tokenize(TokenizeArgs),
    /// Write a token file back to MIDI
    Detokenize(DetokenizeArgs),
    /// Prepare a dataset and run training on it
    Train(TrainArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    musai_core::init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Tokenize(args) => {
            tokio::task::spawn_blocking(move || run_tokenize(&args)).await??;
        }
        Commands::Detokenize(args) => run_detokenize(&args)?,
        Commands::Train(args) => {
            run_train(&args).await?;
        }
    }

    Ok(())
}
