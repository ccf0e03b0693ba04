use std::fmt;

use heft_types::{HeftError, Oid, Result};

/// Version line every pointer file must open with.
pub const VERSION_URL: &str = "https://heft.dev/spec/v1";

/// Blobs larger than this are never pointer candidates.
pub const MAX_POINTER_SIZE: u64 = 1024;

/// A parsed pointer file: the oid and size of the object it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub oid: Oid,
    pub size: u64,
}

/// A pointer discovered at a path in the commit range being pushed.
/// `name` is the repository-relative path the pointer blob sits at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerRecord {
    pub name: String,
    pub oid: Oid,
    pub size: u64,
}

impl Pointer {
    /// Parse a blob as a pointer file.
    ///
    /// The format is line-oriented `key value` pairs with the version line
    /// first. `oid` and `size` are required; any other key is rejected.
    pub fn parse(data: &[u8]) -> Result<Pointer> {
        if data.len() as u64 > MAX_POINTER_SIZE {
            return Err(HeftError::Pointer(format!(
                "blob too large to be a pointer ({} bytes)",
                data.len()
            )));
        }
        let text = std::str::from_utf8(data)
            .map_err(|_| HeftError::Pointer("pointer is not valid utf-8".into()))?;

        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first == format!("version {VERSION_URL}") => {}
            Some(first) => {
                return Err(HeftError::Pointer(format!(
                    "first line is not a version line: {first:?}"
                )));
            }
            None => return Err(HeftError::Pointer("empty blob".into())),
        }

        let mut oid = None;
        let mut size = None;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| HeftError::Pointer(format!("malformed line: {line:?}")))?;
            match key {
                "oid" => {
                    let hex = value.strip_prefix("sha256:").ok_or_else(|| {
                        HeftError::Pointer(format!("unsupported oid algorithm: {value:?}"))
                    })?;
                    oid = Some(Oid::from_hex(hex)?);
                }
                "size" => {
                    let n: u64 = value.parse().map_err(|_| {
                        HeftError::Pointer(format!("invalid size value: {value:?}"))
                    })?;
                    size = Some(n);
                }
                other => {
                    return Err(HeftError::Pointer(format!("unknown key: {other:?}")));
                }
            }
        }

        let oid = oid.ok_or_else(|| HeftError::Pointer("missing oid line".into()))?;
        let size = size.ok_or_else(|| HeftError::Pointer("missing size line".into()))?;
        Ok(Pointer { oid, size })
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version {VERSION_URL}")?;
        writeln!(f, "oid sha256:{}", self.oid)?;
        writeln!(f, "size {}", self.size)
    }
}
