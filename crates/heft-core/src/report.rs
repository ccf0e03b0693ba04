use std::io::{self, Write};

use crate::locks::VerifyMode;
use crate::session::PushSummary;

/// Final verdict of a push, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Ok,
    /// Missing or corrupt objects without allowance, or any other transfer
    /// failure.
    ObjectErrors,
    /// Conflicting third-party locks under enabled verification.
    LockConflict,
}

impl PushStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            PushStatus::Ok => 0,
            PushStatus::ObjectErrors => 2,
            PushStatus::LockConflict => 1,
        }
    }
}

/// Render the end-of-push report and decide the exit status.
///
/// Evaluation order is fixed: opaque transfer errors first, then the
/// missing/corrupt block (fatal without allow-incomplete), then lock state.
/// Object errors preempt lock reporting entirely.
pub fn render(summary: &PushSummary, out: &mut dyn Write) -> io::Result<PushStatus> {
    for err in &summary.other_errors {
        writeln!(out, "{err}")?;
    }

    if !summary.missing.is_empty() || !summary.corrupt.is_empty() {
        let action = if summary.allow_incomplete {
            "missing objects"
        } else {
            "failed"
        };
        writeln!(out, "heft upload {action}:")?;
        for (name, oid) in &summary.missing {
            writeln!(out, "  (missing) {name} ({oid})")?;
        }
        for (name, oid) in &summary.corrupt {
            writeln!(out, "  (corrupt) {name} ({oid})")?;
        }
        if !summary.allow_incomplete {
            writeln!(
                out,
                "hint: Your push was rejected due to missing or corrupt local objects."
            )?;
            writeln!(
                out,
                "hint: You can disable this check with: `git config heft.allowincompletepush true`"
            )?;
            return Ok(PushStatus::ObjectErrors);
        }
    }

    if !summary.other_errors.is_empty() {
        return Ok(PushStatus::ObjectErrors);
    }

    let mut status = PushStatus::Ok;
    if !summary.unowned_locks.is_empty() {
        writeln!(out, "Unable to push locked files:")?;
        for (path, owner) in &summary.unowned_locks {
            writeln!(out, "* {path} - {owner}")?;
        }
        if summary.lock_mode == VerifyMode::Enabled {
            writeln!(out, "Cannot update locked files.")?;
            status = PushStatus::LockConflict;
        } else {
            writeln!(out, "warning: The above files would have halted this push.")?;
        }
    }
    if !summary.owned_locks.is_empty() {
        writeln!(
            out,
            "Consider unlocking your own locked files: (`heft unlock <path>`)"
        )?;
        for path in &summary.owned_locks {
            writeln!(out, "* {path}")?;
        }
    }
    Ok(status)
}
