use clap::Parser;
use color_eyre::Result;
use tdo::cli::{self, Cli};
use tdo::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    // Diagnostics go to stderr so listing output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments and load configuration
    let args = Cli::parse();
    let config = Config::load(args.config.as_deref())?;

    // Dispatch; each error class maps to its own exit code
    if let Err(err) = cli::run(args.command, &config) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }

    Ok(())
}
