//! Proof generation progress, 0 to 100.
//!
//! Purely cosmetic: a UI can render it, nothing depends on it for correctness.

use tokio::sync::watch;

/// Sending half, owned by the generation session.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<u8>,
}

/// Receiving half, handed to whoever renders feedback.
#[derive(Clone, Debug)]
pub struct ProgressWatcher {
    rx: watch::Receiver<u8>,
}

/// A connected reporter/watcher pair starting at 0%.
pub fn channel() -> (ProgressReporter, ProgressWatcher) {
    let (tx, rx) = watch::channel(0);
    (ProgressReporter { tx }, ProgressWatcher { rx })
}

impl ProgressReporter {
    /// A reporter nobody listens to.
    pub fn detached() -> Self {
        channel().0
    }

    /// Advance to `percent`. Never moves backwards, caps at 100.
    pub fn set(&self, percent: u8) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }
}

impl ProgressWatcher {
    pub fn current(&self) -> u8 {
        *self.rx.borrow()
    }

    /// Wait for the next update; `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<u8> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let (reporter, watcher) = channel();
        reporter.set(40);
        reporter.set(20);
        assert_eq!(watcher.current(), 40);
        reporter.set(250);
        assert_eq!(watcher.current(), 100);
    }

    #[test]
    fn test_detached_reporter_does_not_panic() {
        let reporter = ProgressReporter::detached();
        reporter.set(50);
        assert_eq!(reporter.current(), 50);
    }

    #[tokio::test]
    async fn test_watcher_sees_updates() {
        let (reporter, mut watcher) = channel();
        let task = tokio::spawn(async move { watcher.changed().await });
        reporter.set(10);
        assert_eq!(task.await.unwrap(), Some(10));
    }
}
