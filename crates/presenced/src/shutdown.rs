//! Cooperative cancellation shared by signal handlers, stdin and the tick loop.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Clone-safe handle to one cancellation flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, reason: &str) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!(reason, "shutdown requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, returning early once shutdown is requested.
    ///
    /// Returns true if the full duration elapsed.
    pub fn sleep(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Watch stdin on a detached thread; a line reading `q` requests shutdown.
    ///
    /// EOF ends the watcher without requesting anything, since a supervising
    /// process may close our stdin.
    pub fn watch_stdin(&self) {
        let shutdown = self.clone();
        let spawned = std::thread::Builder::new()
            .name("presence-stdin".into())
            .spawn(move || shutdown.watch_lines(std::io::stdin().lock()));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "interactive quit unavailable");
        }
    }

    fn watch_lines(&self, input: impl BufRead) {
        for line in input.lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    self.request("quit requested on stdin");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "stdin watcher stopped");
                    return;
                }
            }
        }
        tracing::debug!("stdin closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_request_is_shared_between_clones() {
        let a = Shutdown::new();
        let b = a.clone();
        assert!(!b.is_requested());
        a.request("test");
        assert!(b.is_requested());
    }

    #[test]
    fn test_sleep_returns_early_when_requested() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.request("test");
        });
        let start = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn test_sleep_completes() {
        assert!(Shutdown::new().sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_q_line_requests_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.watch_lines(Cursor::new("hello\n q \nmore\n"));
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_eof_does_not_request_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.watch_lines(Cursor::new("quit\n"));
        assert!(!shutdown.is_requested());
    }
}
