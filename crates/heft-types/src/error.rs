use thiserror::Error;

use crate::oid::Oid;

pub type Result<T> = std::result::Result<T, HeftError>;

#[derive(Debug, Error)]
pub enum HeftError {
    #[error("git: {0}")]
    Git(String),

    #[error("not inside a git repository (or any work tree)")]
    NotARepository,

    #[error("invalid pointer: {0}")]
    Pointer(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("remote '{0}' has no heft endpoint; set remote.{0}.hefturl or heft.url")]
    MissingEndpoint(String),

    #[error("remote: {0}")]
    Remote(String),

    #[error("lock verification failed: {0}")]
    LockVerification(String),

    #[error("cannot read local object for {name} ({oid}): {source}")]
    ObjectRead {
        name: String,
        oid: Oid,
        #[source]
        source: std::io::Error,
    },

    #[error("ref {refname:?}: {source}")]
    Ref {
        refname: String,
        #[source]
        source: Box<HeftError>,
    },

    #[error("scan: {0}")]
    Scan(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeftError {
    /// Fold the per-object failures of one scan into a single error.
    pub fn scan_failed(errors: &[HeftError]) -> HeftError {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        HeftError::Scan(joined)
    }

    /// Wrap an error with the ref update it belongs to.
    pub fn for_ref(refname: &str, source: HeftError) -> HeftError {
        HeftError::Ref {
            refname: refname.to_string(),
            source: Box::new(source),
        }
    }
}
