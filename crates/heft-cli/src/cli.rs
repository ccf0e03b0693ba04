use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "heft",
    version,
    about = "Content-addressed large file transport for git",
    after_help = "\
Configuration (git config):
  heft.url                   Store endpoint used for every remote
  remote.<name>.hefturl      Per-remote endpoint (overrides heft.url)
  heft.token                 Bearer token for the endpoint
  heft.batchsize             Objects announced per batch request (default 100)
  heft.concurrenttransfers   Parallel object uploads, 1-64 (default 8)
  heft.retries               HTTP retry attempts (default 3)
  heft.allowincompletepush   Keep pushing when local objects are absent
  heft.locksverify           Enforce server-side file locks (unset: warn only)

Environment variables:
  HEFT_TOKEN        Bearer token for the endpoint (overrides heft.token)"
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Upload the large objects the given refs reference
    Push {
        /// Remote to push to
        remote: String,

        /// Refs to push (defaults to the current branch)
        refs: Vec<String>,

        /// Only show what would be pushed, don't transfer anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Walk all reachable history instead of just the new commits
        #[arg(long)]
        all: bool,
    },

    /// Pre-push hook entry point; reads ref updates from stdin
    PrePush {
        /// Remote name git is pushing to
        remote: String,

        /// Remote URL, as git passes it to the hook
        url: Option<String>,
    },
}
