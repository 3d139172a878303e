use anyhow::Result;
use clap::Parser;
use kcube_cli::command::{self, Command};
use kcube_cli::trace;
use log::info;

#[derive(Debug, Parser)]
#[command(version, author, about = "K-Cube vault CLI")]
pub struct Args {
    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    cmd: Command,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();

    let log_dir = format!("{}/.kcube/logs", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()));
    let _guards = trace::init_logging(&log_dir, &args.log_level)?;
    info!("kcube starting: {:?}", &args.cmd);

    if let Err(e) = command::run(args.cmd).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
