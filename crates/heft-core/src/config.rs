use std::collections::HashMap;

use heft_types::{HeftError, Result};

use crate::git::GitEnv;
use crate::locks::VerifyMode;

/// Environment variable overriding the configured auth token.
pub const TOKEN_ENV: &str = "HEFT_TOKEN";

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_CONCURRENT_TRANSFERS: usize = 8;
const MAX_CONCURRENT_TRANSFERS: usize = 64;
const DEFAULT_RETRIES: u32 = 3;

/// Everything a push reads from git config, resolved once up front.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub remote: String,
    /// Object store endpoint, from `remote.<name>.hefturl` or `heft.url`.
    pub endpoint: String,
    pub token: Option<String>,
    pub allow_incomplete_push: bool,
    pub batch_size: usize,
    pub concurrent_transfers: usize,
    pub retries: u32,
    pub locks_verify: VerifyMode,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub dry_run: bool,
}

impl PushConfig {
    pub fn load(env: &GitEnv, remote: &str) -> Result<Self> {
        let values = env.config_values()?;

        let endpoint = values
            .get(&format!("remote.{remote}.hefturl"))
            .or_else(|| values.get("heft.url"))
            .cloned()
            .ok_or_else(|| HeftError::MissingEndpoint(remote.to_string()))?;

        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| values.get("heft.token").cloned());

        let batch_size = parse_key(&values, "heft.batchsize")?.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(HeftError::Config(
                "heft.batchsize: must be at least 1".into(),
            ));
        }
        let concurrent_transfers = parse_key(&values, "heft.concurrenttransfers")?
            .unwrap_or(DEFAULT_CONCURRENT_TRANSFERS)
            .clamp(1, MAX_CONCURRENT_TRANSFERS);
        let retries = parse_key(&values, "heft.retries")?.unwrap_or(DEFAULT_RETRIES);

        Ok(Self {
            remote: remote.to_string(),
            endpoint,
            token,
            allow_incomplete_push: bool_key(&values, "heft.allowincompletepush")?
                .unwrap_or(false),
            batch_size,
            concurrent_transfers,
            retries,
            locks_verify: VerifyMode::from_config(
                values.get("heft.locksverify").map(String::as_str),
            )?,
            committer_name: values.get("user.name").cloned(),
            committer_email: values.get("user.email").cloned(),
            dry_run: false,
        })
    }
}

/// Git boolean literals. An empty value counts as false, same as git itself.
pub(crate) fn parse_git_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" | "" => Some(false),
        _ => None,
    }
}

fn bool_key(values: &HashMap<String, String>, key: &str) -> Result<Option<bool>> {
    match values.get(key) {
        None => Ok(None),
        Some(v) => parse_git_bool(v)
            .map(Some)
            .ok_or_else(|| HeftError::Config(format!("{key}: invalid boolean {v:?}"))),
    }
}

fn parse_key<T: std::str::FromStr>(
    values: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    match values.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| HeftError::Config(format!("{key}: invalid value {v:?}"))),
    }
}
