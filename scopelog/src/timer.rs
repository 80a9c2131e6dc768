//! Periodic background callbacks
//!
//! A [`PeriodicTask`] runs a callback on a dedicated thread at a fixed
//! interval until it is stopped or the callback asks to break. Stopping joins
//! the thread, so once [`PeriodicTask::stop`] returns the callback will not run
//! again.

use std::ops::ControlFlow;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, warn};

pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a thread named `name` calling `callback` every `interval`.
    ///
    /// The first call happens one interval after spawning.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<F>(name: &str, interval: Duration, mut callback: F) -> std::io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticker = tick(interval);
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new().name(name.to_string()).spawn(move || {
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if callback().is_break() {
                            debug!("{thread_name}: callback requested stop");
                            break;
                        }
                    }
                }
            }
        })?;

        Ok(Self { name: name.to_string(), stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Stop the timer and wait for an in-flight callback to finish.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel, which wakes the thread.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{}: timer thread panicked", self.name);
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callback_runs_until_stopped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut task = PeriodicTask::spawn("test-timer", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();

        while calls.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        assert!(!task.is_running());

        let after_stop = calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_callback_can_break() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut task = PeriodicTask::spawn("test-break", Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Break(())
        })
        .unwrap();

        while task.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        task.stop();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
