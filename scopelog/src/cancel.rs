//! Cooperative cancellation
//!
//! A [`CancelToken`] is set on Ctrl+C or when a child of [`run_parallel`]
//! fails. Long-running host operations poll [`CancelToken::is_cancelled`] or
//! await [`CancelToken::cancelled`].

use std::future::Future;
use std::sync::Arc;

use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::scope;

#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only ends on cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Cancel `token` when the process receives Ctrl+C.
pub fn listen_for_ctrl_c(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Ctrl+C received, cancelling");
                    token.cancel();
                }
            }
            () = token.cancelled() => {}
        }
    })
}

/// Run `f` concurrently for every item, each child on its own snapshot of the
/// caller's scope stack.
///
/// The first child failure cancels `token` and is returned; remaining children
/// are dropped.
///
/// # Errors
/// Returns the first error produced by a child.
pub async fn run_parallel<I, F, Fut, T, E>(token: &CancelToken, items: I, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: Fn(I::Item, CancelToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let children = items.into_iter().map(|item| {
        let token = token.clone();
        let child = f(item, token.clone());
        scope::fork(async move {
            let result = child.await;
            if result.is_err() {
                token.cancel();
            }
            result
        })
    });
    futures::future::try_join_all(children).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_after_cancel_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled()).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_parallel_collects_in_order() {
        let token = CancelToken::new();
        let results =
            run_parallel(&token, [1, 2, 3], |n, _| async move { Ok::<_, String>(n * 10) })
                .await
                .unwrap();
        assert_eq!(results, vec![10, 20, 30]);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_parallel_failure_cancels_token() {
        let token = CancelToken::new();
        let result = run_parallel(&token, [1, 2, 3], |n, token| async move {
            if n == 2 {
                return Err(format!("item {n} failed"));
            }
            token.cancelled().await;
            Ok(n)
        })
        .await;

        assert_eq!(result, Err("item 2 failed".to_string()));
        assert!(token.is_cancelled());
    }
}
