use std::io::{self, IsTerminal, Stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing_subscriber::fmt::MakeWriter;

use heft_core::progress::MeterSnapshot;

use crate::format::format_bytes;

const PROGRESS_REDRAW_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_PROGRESS_COLUMNS: usize = 120;

/// True while a transfer status line is being displayed on stderr.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes all stderr writes between the status line and tracing.
static STDERR_LOCK: Mutex<()> = Mutex::new(());

fn acquire_stderr_lock() -> MutexGuard<'static, ()> {
    STDERR_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Progress-aware tracing writer
// ---------------------------------------------------------------------------

/// A [`MakeWriter`] that clears the status line before each tracing event,
/// keeping log messages off the `\r`-based transfer display.
pub(crate) struct ProgressAwareStderr;

/// Holds the `STDERR_LOCK` guard for the lifetime of a single tracing write,
/// from the line-clear through the full log message.
pub(crate) struct ProgressWriter {
    _guard: MutexGuard<'static, ()>,
    inner: Stderr,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareStderr {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let guard = acquire_stderr_lock();
        let mut stderr = io::stderr();

        if PROGRESS_ACTIVE.load(Relaxed) && stderr.is_terminal() {
            let _ = stderr.write_all(b"\r\x1b[2K");
        }

        ProgressWriter {
            _guard: guard,
            inner: stderr,
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer status line
// ---------------------------------------------------------------------------

/// Single-line stderr renderer fed by the meter.
///
/// Snapshots arrive from scan and upload worker threads, so the state sits
/// behind a mutex and the handle clones freely.
#[derive(Clone)]
pub(crate) struct TransferRenderer {
    state: Arc<Mutex<RenderState>>,
}

struct RenderState {
    last: MeterSnapshot,
    last_draw: Instant,
    last_line_len: usize,
    rendered_any: bool,
}

impl TransferRenderer {
    pub(crate) fn new() -> Self {
        PROGRESS_ACTIVE.store(true, Relaxed);
        Self {
            state: Arc::new(Mutex::new(RenderState {
                last: MeterSnapshot::default(),
                last_draw: Instant::now(),
                last_line_len: 0,
                rendered_any: false,
            })),
        }
    }

    pub(crate) fn on_snapshot(&self, snap: &MeterSnapshot) {
        let mut state = self.lock_state();
        state.last = snap.clone();
        state.render(false);
    }

    /// Draw the final counters and move off the status line.
    pub(crate) fn finish(&self) {
        let mut state = self.lock_state();
        if !state.rendered_any {
            PROGRESS_ACTIVE.store(false, Relaxed);
            return;
        }
        state.render(true);
        // Final newline under the lock so it doesn't race with tracing.
        {
            let _guard = acquire_stderr_lock();
            eprintln!();
        }
        PROGRESS_ACTIVE.store(false, Relaxed);
        state.rendered_any = false;
        state.last_line_len = 0;
    }

    fn lock_state(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RenderState {
    fn render(&mut self, force: bool) {
        if !force && self.rendered_any && self.last_draw.elapsed() < PROGRESS_REDRAW_INTERVAL {
            return;
        }
        self.last_draw = Instant::now();

        let current = if self.last.current.is_empty() {
            "-"
        } else {
            &self.last.current
        };
        let prefix = format!(
            "Uploading: {}/{} objects, {}/{}, Current: ",
            self.last.done_objects,
            self.last.total_objects,
            format_bytes(self.last.done_bytes),
            format_bytes(self.last.total_bytes),
        );

        let columns = terminal_columns().saturating_sub(5);
        let available = columns.saturating_sub(prefix.chars().count());
        let current = truncate_middle(current, available);
        let line = format!("{prefix}{current}");
        let line_len = line.chars().count();
        let pad_len = self.last_line_len.saturating_sub(line_len);

        {
            let _guard = acquire_stderr_lock();
            eprint!("\r{line}{}", " ".repeat(pad_len));
            let _ = io::stderr().flush();
        }

        self.last_line_len = line_len;
        self.rendered_any = true;
    }
}

fn terminal_columns() -> usize {
    terminal_columns_os()
        .or_else(|| {
            std::env::var("COLUMNS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&v| v > 0)
        })
        .unwrap_or(DEFAULT_PROGRESS_COLUMNS)
}

/// Query the OS for the terminal width of stderr.
#[cfg(unix)]
fn terminal_columns_os() -> Option<usize> {
    use libc::{STDERR_FILENO, TIOCGWINSZ, ioctl, winsize};
    unsafe {
        let mut ws: winsize = std::mem::zeroed();
        if ioctl(STDERR_FILENO, TIOCGWINSZ, &mut ws) == 0 && ws.ws_col > 0 {
            Some(ws.ws_col as usize)
        } else {
            None
        }
    }
}

#[cfg(not(unix))]
fn terminal_columns_os() -> Option<usize> {
    None
}

/// Truncate a path to `max_chars`, keeping its beginning and end with `...`
/// in the middle (e.g. `/very/l...file.txt`).
fn truncate_middle(input: &str, max_chars: usize) -> String {
    let len = input.chars().count();
    if len <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }

    let keep = max_chars - 3;
    let head = keep / 2;
    let tail = keep - head;
    let head_str: String = input.chars().take(head).collect();
    let tail_str: String = input.chars().skip(len - tail).collect();
    format!("{head_str}...{tail_str}")
}
