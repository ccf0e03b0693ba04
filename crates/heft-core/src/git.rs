use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use heft_types::{HeftError, Result};

/// All-zero sha a remote reports for a ref it does not have.
pub fn is_zero_sha(sha: &str) -> bool {
    !sha.is_empty() && sha.bytes().all(|b| b == b'0')
}

/// Handle on the repository git is managing for us.
///
/// Every git invocation goes through this type so the working directory and
/// git directory are pinned once at discovery instead of re-resolved per call.
#[derive(Debug, Clone)]
pub struct GitEnv {
    work_dir: PathBuf,
    git_dir: PathBuf,
}

impl GitEnv {
    /// Discover the repository containing `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        let output = Command::new("git")
            .arg("-C")
            .arg(start)
            .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
            .output()?;
        if !output.status.success() {
            return Err(HeftError::NotARepository);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        let work_dir = lines
            .next()
            .ok_or_else(|| HeftError::Git("rev-parse returned no toplevel".into()))?;
        let git_dir = lines
            .next()
            .ok_or_else(|| HeftError::Git("rev-parse returned no git dir".into()))?;
        Ok(Self {
            work_dir: PathBuf::from(work_dir),
            git_dir: PathBuf::from(git_dir),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.work_dir).args(args);
        cmd
    }

    /// Run git and return stdout, failing with captured stderr on non-zero exit.
    pub fn run(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "running git");
        let output = self.command(args).output()?;
        check_status(&output, args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// All git config visible from this repository, last value winning.
    /// Valueless keys (`[heft] allowincompletepush`) read as "true".
    pub fn config_values(&self) -> Result<HashMap<String, String>> {
        let output = self.command(&["config", "--list", "-z"]).output()?;
        check_status(&output, &["config", "--list", "-z"])?;
        let text = String::from_utf8_lossy(&output.stdout);
        let mut values = HashMap::new();
        for entry in text.split('\0') {
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('\n') {
                Some((key, value)) => values.insert(key.to_string(), value.to_string()),
                None => values.insert(entry.to_string(), "true".to_string()),
            };
        }
        Ok(values)
    }

    /// Resolve a revision to a full sha.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        Ok(self.run(&["rev-parse", "--verify", rev])?.trim().to_string())
    }

    /// Full ref name for a symbolic ref, e.g. `HEAD` -> `refs/heads/main`.
    pub fn symbolic_full_name(&self, name: &str) -> Result<String> {
        Ok(self
            .run(&["rev-parse", "--symbolic-full-name", name])?
            .trim()
            .to_string())
    }

    /// Short name of the currently checked out branch.
    pub fn current_branch(&self) -> Result<String> {
        let name = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(name.trim().to_string())
    }

    /// Sha the remote currently has for `refname`, or `None` if it has no
    /// such ref.
    pub fn ls_remote(&self, remote: &str, refname: &str) -> Result<Option<String>> {
        let stdout = self.run(&["ls-remote", remote, refname])?;
        for line in stdout.lines() {
            if let Some((sha, name)) = line.split_once('\t') {
                if name == refname {
                    return Ok(Some(sha.to_string()));
                }
            }
        }
        Ok(None)
    }

    /// Spawn git with stdout piped, for commands whose output is streamed.
    pub fn spawn_piped(&self, args: &[&str]) -> Result<std::process::Child> {
        let child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }
}

fn check_status(output: &Output, args: &[&str]) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(HeftError::Git(format!(
        "git {} failed: {}",
        args.first().copied().unwrap_or(""),
        stderr.trim()
    )))
}
