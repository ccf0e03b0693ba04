use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};

use crossbeam_channel::{Receiver, bounded};
use tracing::debug;

use heft_types::{HeftError, Result};

use crate::git::GitEnv;
use crate::pointer::{MAX_POINTER_SIZE, Pointer, PointerRecord};
use crate::scan::{PointerSource, ScanCallback, ScanItem};

const RESOLVER_THREADS: usize = 4;
const CANDIDATE_BUFFER: usize = 512;

/// Pointer scanner over `git rev-list --objects` output.
///
/// One rev-list process enumerates candidate objects; a small pool of
/// resolver threads, each driving its own pair of `git cat-file` children,
/// sizes the blobs and parses the small ones as pointers. The callback is
/// invoked straight from the resolver threads.
pub struct GitPointerSource {
    env: GitEnv,
    resolvers: usize,
}

struct Candidate {
    sha: String,
    path: String,
}

impl GitPointerSource {
    pub fn new(env: GitEnv) -> Self {
        Self {
            env,
            resolvers: RESOLVER_THREADS,
        }
    }

    fn scan(&self, rev_args: &[&str], cb: &ScanCallback<'_>) -> Result<()> {
        let mut args = vec!["rev-list", "--objects"];
        args.extend_from_slice(rev_args);
        debug!(?args, "starting pointer scan");

        let mut child = self.env.spawn_piped(&args)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HeftError::Git("rev-list stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HeftError::Git("rev-list stderr unavailable".into()))?;

        let stderr_text = std::thread::scope(|s| {
            let (cand_tx, cand_rx) = bounded::<Candidate>(CANDIDATE_BUFFER);

            // Parse rev-list lines into candidates. Lines without a path are
            // commits; an empty path is the root tree. Neither can be a
            // pointer blob.
            s.spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    let Some((sha, path)) = line.split_once(' ') else {
                        continue;
                    };
                    if path.is_empty() {
                        continue;
                    }
                    let cand = Candidate {
                        sha: sha.to_string(),
                        path: path.to_string(),
                    };
                    if cand_tx.send(cand).is_err() {
                        break;
                    }
                }
            });

            let stderr_reader = s.spawn(move || {
                let mut buf = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut buf);
                buf
            });

            for _ in 0..self.resolvers {
                let rx = cand_rx.clone();
                s.spawn(move || resolve_candidates(&self.env, rx, cb));
            }
            drop(cand_rx);

            stderr_reader.join().unwrap_or_default()
        });

        let status = child.wait()?;
        if !status.success() {
            return Err(HeftError::Git(format!(
                "rev-list failed: {}",
                stderr_text.trim()
            )));
        }
        Ok(())
    }
}

impl PointerSource for GitPointerSource {
    fn scan_ref_with_deleted(&self, tip: &str, cb: &ScanCallback<'_>) -> Result<()> {
        self.scan(&[tip], cb)
    }

    fn scan_multi_range(
        &self,
        tip: &str,
        exclude: &[String],
        cb: &ScanCallback<'_>,
    ) -> Result<()> {
        let mut rev_args: Vec<&str> = vec![tip];
        if !exclude.is_empty() {
            rev_args.push("--not");
            rev_args.extend(exclude.iter().map(String::as_str));
        }
        self.scan(&rev_args, cb)
    }
}

fn resolve_candidates(env: &GitEnv, rx: Receiver<Candidate>, cb: &ScanCallback<'_>) {
    let mut resolver = match PointerResolver::spawn(env) {
        Ok(resolver) => resolver,
        Err(e) => {
            cb(ScanItem::Err(e));
            return;
        }
    };
    for cand in rx.iter() {
        match resolver.resolve(&cand) {
            Ok(Resolved::Pointer(record)) => cb(ScanItem::Record(record)),
            Ok(Resolved::NotPointer) => {}
            Ok(Resolved::Missing) => cb(ScanItem::Err(HeftError::Scan(format!(
                "object {} for {} not found in local repository",
                cand.sha, cand.path
            )))),
            // A pipe failure poisons this resolver; remaining candidates go
            // to its siblings.
            Err(e) => {
                cb(ScanItem::Err(e));
                return;
            }
        }
    }
}

enum Resolved {
    Pointer(PointerRecord),
    NotPointer,
    Missing,
}

/// Size-check-then-read pair of cat-file children, so blobs above the
/// pointer limit never travel through the pipe.
struct PointerResolver {
    check: CatFileChild,
    full: CatFileChild,
}

impl PointerResolver {
    fn spawn(env: &GitEnv) -> Result<Self> {
        Ok(Self {
            check: CatFileChild::spawn(env, "--batch-check")?,
            full: CatFileChild::spawn(env, "--batch")?,
        })
    }

    fn resolve(&mut self, cand: &Candidate) -> Result<Resolved> {
        self.check.send(&cand.sha)?;
        let (kind, size) = match self.check.read_header()? {
            Header::Missing => return Ok(Resolved::Missing),
            Header::Object { kind, size } => (kind, size),
        };
        if kind != "blob" || size > MAX_POINTER_SIZE {
            return Ok(Resolved::NotPointer);
        }

        self.full.send(&cand.sha)?;
        let data = match self.full.read_header()? {
            Header::Missing => return Ok(Resolved::Missing),
            Header::Object { size, .. } => self.full.read_body(size)?,
        };
        match Pointer::parse(&data) {
            Ok(pointer) => Ok(Resolved::Pointer(PointerRecord {
                name: cand.path.clone(),
                oid: pointer.oid,
                size: pointer.size,
            })),
            // A small blob that is not a pointer is an ordinary file.
            Err(_) => Ok(Resolved::NotPointer),
        }
    }
}

enum Header {
    Missing,
    Object { kind: String, size: u64 },
}

struct CatFileChild {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CatFileChild {
    fn spawn(env: &GitEnv, mode: &str) -> Result<Self> {
        let mut child = env
            .command(&["cat-file", mode])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HeftError::Git("cat-file stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HeftError::Git("cat-file stdout unavailable".into()))?;
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn send(&mut self, sha: &str) -> Result<()> {
        writeln!(self.stdin, "{sha}")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_header(&mut self) -> Result<Header> {
        let mut line = String::new();
        self.stdout.read_line(&mut line)?;
        let mut parts = line.split_whitespace();
        let _sha = parts.next();
        match (parts.next(), parts.next()) {
            (Some("missing"), _) => Ok(Header::Missing),
            (Some(kind), Some(size)) => Ok(Header::Object {
                kind: kind.to_string(),
                size: size.parse().map_err(|_| {
                    HeftError::Git(format!("cat-file: bad object size in {line:?}"))
                })?,
            }),
            _ => Err(HeftError::Git(format!(
                "cat-file: unexpected response {line:?}"
            ))),
        }
    }

    /// Read `size` content bytes plus the protocol's trailing newline.
    fn read_body(&mut self, size: u64) -> Result<Vec<u8>> {
        let mut data = vec![0u8; size as usize];
        self.stdout.read_exact(&mut data)?;
        let mut lf = [0u8; 1];
        self.stdout.read_exact(&mut lf)?;
        Ok(data)
    }
}

impl Drop for CatFileChild {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
