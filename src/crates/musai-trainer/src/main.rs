use anyhow::Result;
use clap::{ArgAction, Parser};
use musai_trainer::cli::{run_train, TrainArgs};

#[derive(Parser, Debug)]
#[command(name = "trainer")]
#[command(about = "Prepare a token dataset and drive RWKV training on it", long_about = None)]
struct Cli {
    #[command(flatten)]
    args: TrainArgs,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Less logging (-q warnings, -qq errors only)
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    musai_core::init_logging(cli.verbose, cli.quiet);
    run_train(&cli.args).await?;
    Ok(())
}
