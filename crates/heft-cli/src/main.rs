mod cli;
mod cmd;
mod dispatch;
mod format;
mod progress;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use dispatch::dispatch_command;
use progress::ProgressAwareStderr;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over the -v mapping when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressAwareStderr)
        .init();

    match dispatch_command(&cli.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
