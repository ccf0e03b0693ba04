use std::io::{self, BufRead};
use std::path::Path;

use heft_core::git::{GitEnv, is_zero_sha};
use heft_core::push::RefUpdate;

use super::push::run_session;

/// Entry point for git's pre-push hook.
///
/// Git feeds the hook one line per ref being pushed:
/// `<local-ref> <local-sha> <remote-ref> <remote-sha>`.
pub(crate) fn run_pre_push(
    remote: &str,
    _url: Option<&str>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let env = GitEnv::discover(Path::new("."))?;
    let updates = parse_updates(io::stdin().lock())?;
    run_session(env, remote, updates, false, false)
}

fn parse_updates(input: impl BufRead) -> Result<Vec<RefUpdate>, Box<dyn std::error::Error>> {
    let mut updates = Vec::new();
    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(' ').collect();
        let [local_name, local_sha, remote_name, remote_sha] = fields.as_slice() else {
            return Err(format!("malformed pre-push line: {line:?}").into());
        };
        // A zero local sha deletes the remote ref; nothing to upload.
        if is_zero_sha(local_sha) {
            continue;
        }
        updates.push(RefUpdate {
            local_name: (*local_name).to_string(),
            local_sha: (*local_sha).to_string(),
            remote_name: (*remote_name).to_string(),
            remote_sha: (*remote_sha).to_string(),
        });
    }
    Ok(updates)
}
