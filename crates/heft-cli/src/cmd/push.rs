use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use heft_core::config::PushConfig;
use heft_core::git::GitEnv;
use heft_core::progress::Meter;
use heft_core::push::{RefUpdate, push_ref_updates};
use heft_core::report;
use heft_core::scan::GitPointerSource;
use heft_core::session::UploadSession;
use heft_core::store::LocalStore;
use heft_remote::{RestClient, RetryConfig};

use crate::progress::TransferRenderer;

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

pub(crate) fn run_push(
    remote: &str,
    refs: &[String],
    dry_run: bool,
    push_all: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let env = GitEnv::discover(Path::new("."))?;
    let updates = resolve_updates(&env, remote, refs)?;
    run_session(env, remote, updates, dry_run, push_all)
}

/// Turn ref names into concrete updates against the remote's current tips.
fn resolve_updates(
    env: &GitEnv,
    remote: &str,
    refs: &[String],
) -> Result<Vec<RefUpdate>, Box<dyn std::error::Error>> {
    let names: Vec<String> = if refs.is_empty() {
        vec![env.current_branch()?]
    } else {
        refs.to_vec()
    };

    let mut updates = Vec::with_capacity(names.len());
    for name in &names {
        let full = match env.symbolic_full_name(name) {
            // Raw revisions have no symbolic name; push them as given.
            Ok(full) if !full.is_empty() => full,
            _ => name.clone(),
        };
        let local_sha = env.rev_parse(name)?;
        let remote_sha = env
            .ls_remote(remote, &full)?
            .unwrap_or_else(|| ZERO_SHA.to_string());
        updates.push(RefUpdate {
            local_name: full.clone(),
            local_sha,
            remote_name: full,
            remote_sha,
        });
    }
    Ok(updates)
}

/// Shared push driver for `push` and `pre-push`: configure, scan, transfer,
/// report.
///
/// The report renders whether or not the push succeeded, so partial results
/// always reach the user; a push error is printed afterwards and turns the
/// exit code into 2.
pub(crate) fn run_session(
    env: GitEnv,
    remote: &str,
    updates: Vec<RefUpdate>,
    dry_run: bool,
    push_all: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    if updates.is_empty() {
        return Ok(0);
    }

    let mut config = PushConfig::load(&env, remote)?;
    config.dry_run = dry_run;
    tracing::debug!(
        "pushing {} ref update(s) to {remote} via {}",
        updates.len(),
        config.endpoint
    );

    let client = Arc::new(RestClient::new(
        &config.endpoint,
        config.token.as_deref(),
        RetryConfig {
            max_retries: config.retries,
            ..RetryConfig::default()
        },
    )?);

    let store = LocalStore::new(env.git_dir());
    let mut renderer = None;
    let meter = if !dry_run && io::stderr().is_terminal() {
        let shared = TransferRenderer::new();
        renderer = Some(shared.clone());
        Meter::new(move |snap| shared.on_snapshot(&snap))
    } else {
        Meter::disabled()
    };

    let mut session = UploadSession::new(&config, store, meter, Box::new(io::stdout()));
    let scanner = GitPointerSource::new(env);
    let result = push_ref_updates(
        &mut session,
        &scanner,
        client.clone(),
        client.as_ref(),
        &updates,
        push_all,
    );

    let summary = session.finish();
    if let Some(renderer) = renderer {
        renderer.finish();
    }

    let status = report::render(&summary, &mut io::stderr())?;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        return Ok(2);
    }
    Ok(status.exit_code())
}
