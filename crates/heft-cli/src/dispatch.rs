use crate::cli::Commands;
use crate::cmd;

/// Run one subcommand and return the process exit code.
pub(crate) fn dispatch_command(command: &Commands) -> Result<i32, Box<dyn std::error::Error>> {
    match command {
        Commands::Push {
            remote,
            refs,
            dry_run,
            all,
        } => cmd::push::run_push(remote, refs, *dry_run, *all),
        Commands::PrePush { remote, url } => cmd::pre_push::run_pre_push(remote, url.as_deref()),
    }
}
