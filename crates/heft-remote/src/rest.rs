use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use heft_types::{HeftError, Oid, Result};

use crate::retry::HttpRetryError;
use crate::{LockClient, ObjectTransport, RetryConfig};

/// Media type of the batch and locks endpoints.
pub const JSON_MEDIA_TYPE: &str = "application/vnd.heft+json";

const LOCKS_PAGE_LIMIT: usize = 100;

/// One object named in a batch announcement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchObjectSpec {
    pub oid: Oid,
    pub size: u64,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    operation: &'static str,
    transfers: &'static [&'static str],
    objects: &'a [BatchObjectSpec],
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    objects: Vec<BatchObjectResult>,
}

/// The server's verdict for one announced object.
///
/// No upload action and no error means the server already has the object.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchObjectResult {
    pub oid: Oid,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub actions: Option<ObjectActions>,
    #[serde(default)]
    pub error: Option<ObjectError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectActions {
    #[serde(default)]
    pub upload: Option<UploadEndpoint>,
}

/// Where and how to PUT one object's bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadEndpoint {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectError {
    pub code: u32,
    pub message: String,
}

/// A path lock held on the remote.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLock {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub owner: Option<LockOwner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockOwner {
    pub name: String,
}

impl RemoteLock {
    pub fn owner_name(&self) -> &str {
        self.owner.as_ref().map(|o| o.name.as_str()).unwrap_or("unknown")
    }
}

#[derive(Debug, Deserialize)]
struct LocksResponse {
    #[serde(default)]
    locks: Vec<RemoteLock>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// HTTP client for a heft endpoint: batch announcements, object PUTs, and
/// the locks listing.
#[derive(Debug)]
pub struct RestClient {
    /// Base URL, e.g. "https://example.com/info/heft"
    base_url: String,
    agent: ureq::Agent,
    token: Option<String>,
    retry: RetryConfig,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<&str>, retry: RetryConfig) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(HeftError::Remote(format!(
                "endpoint must be an http(s) URL: {base_url}"
            )));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300))
            .build();

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            token: token.map(|t| t.to_string()),
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    fn apply_auth(&self, req: ureq::Request) -> ureq::Request {
        if let Some(ref token) = self.token {
            req.set("Authorization", &format!("Bearer {token}"))
        } else {
            req
        }
    }

    /// Retry a closure on transient errors with exponential backoff + jitter.
    #[allow(clippy::result_large_err)]
    fn retry_call<T>(
        &self,
        op_name: &str,
        f: impl Fn() -> std::result::Result<T, ureq::Error>,
    ) -> std::result::Result<T, ureq::Error> {
        crate::retry::retry_http(&self.retry, op_name, f)
    }

    /// Retry a closure that performs both HTTP request and body read.
    fn retry_call_body<T>(
        &self,
        op_name: &str,
        f: impl Fn() -> std::result::Result<T, HttpRetryError>,
    ) -> std::result::Result<T, HttpRetryError> {
        crate::retry::retry_http_body(&self.retry, op_name, f)
    }

    /// Announce `objects` for upload; returns the server's per-object verdicts.
    pub fn batch_upload(&self, objects: &[BatchObjectSpec]) -> Result<Vec<BatchObjectResult>> {
        let url = self.url("objects/batch");
        let body = self
            .retry_call_body("objects/batch", || {
                let req = self
                    .apply_auth(self.agent.post(&url))
                    .set("Accept", JSON_MEDIA_TYPE)
                    .set("Content-Type", JSON_MEDIA_TYPE);
                let resp = req
                    .send_json(BatchRequest {
                        operation: "upload",
                        transfers: &["basic"],
                        objects,
                    })
                    .map_err(HttpRetryError::http)?;
                let mut buf = Vec::new();
                resp.into_reader()
                    .read_to_end(&mut buf)
                    .map_err(HttpRetryError::Io)?;
                Ok(buf)
            })
            .map_err(|e| HeftError::Remote(format!("objects/batch: {e}")))?;
        let parsed: BatchResponse = serde_json::from_slice(&body)
            .map_err(|e| HeftError::Remote(format!("objects/batch parse: {e}")))?;
        Ok(parsed.objects)
    }

    /// PUT one object's bytes to the endpoint the batch returned.
    ///
    /// Action headers win over client defaults; the bearer token is only
    /// attached for same-origin hrefs that did not bring their own
    /// Authorization header.
    pub fn upload_object(&self, endpoint: &UploadEndpoint, path: &Path, size: u64) -> Result<()> {
        let url = if endpoint.href.starts_with("http://") || endpoint.href.starts_with("https://")
        {
            endpoint.href.clone()
        } else {
            self.url(&endpoint.href)
        };
        let has_auth_header = endpoint
            .header
            .keys()
            .any(|k| k.eq_ignore_ascii_case("authorization"));

        self.retry_call_body("object upload", || {
            let mut req = self
                .agent
                .put(&url)
                .set("Content-Type", "application/octet-stream")
                .set("Content-Length", &size.to_string());
            for (k, v) in &endpoint.header {
                req = req.set(k, v);
            }
            if !has_auth_header && url.starts_with(&self.base_url) {
                req = self.apply_auth(req);
            }
            let file = File::open(path).map_err(HttpRetryError::Io)?;
            req.send(file).map_err(HttpRetryError::http)?;
            Ok(())
        })
        .map_err(|e| HeftError::Remote(format!("upload: {e}")))
    }

    /// Page through the locks the server would verify for `refspec`.
    pub fn list_locks(&self, refspec: Option<&str>) -> Result<Vec<RemoteLock>> {
        let mut locks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut url = format!("{}/locks?limit={LOCKS_PAGE_LIMIT}", self.base_url);
            if let Some(r) = refspec {
                url.push_str(&format!("&refspec={}", encode_query(r)));
            }
            if let Some(c) = &cursor {
                url.push_str(&format!("&cursor={}", encode_query(c)));
            }
            let body = self
                .retry_call_body("locks", || {
                    let req = self
                        .apply_auth(self.agent.get(&url))
                        .set("Accept", JSON_MEDIA_TYPE);
                    let resp = req.call().map_err(HttpRetryError::http)?;
                    let mut buf = Vec::new();
                    resp.into_reader()
                        .read_to_end(&mut buf)
                        .map_err(HttpRetryError::Io)?;
                    Ok(buf)
                })
                .map_err(|e| HeftError::Remote(format!("locks: {e}")))?;
            let page: LocksResponse = serde_json::from_slice(&body)
                .map_err(|e| HeftError::Remote(format!("locks parse: {e}")))?;
            locks.extend(page.locks);
            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }
        Ok(locks)
    }
}

impl ObjectTransport for RestClient {
    fn batch_upload(&self, objects: &[BatchObjectSpec]) -> Result<Vec<BatchObjectResult>> {
        RestClient::batch_upload(self, objects)
    }

    fn upload(&self, endpoint: &UploadEndpoint, path: &Path, size: u64) -> Result<()> {
        self.upload_object(endpoint, path, size)
    }
}

impl LockClient for RestClient {
    fn list_locks(&self, refspec: Option<&str>) -> Result<Vec<RemoteLock>> {
        RestClient::list_locks(self, refspec)
    }
}

/// Percent-encode a query value, keeping '/' readable for refspecs.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
