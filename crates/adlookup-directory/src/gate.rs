//! Serialization of directory operations.

use std::future::Future;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

/// Admits one directory operation at a time.
///
/// Waiters are served in FIFO order. The application owns a single gate and hands an
/// `Arc<SerializationGate>` to every client that must share it.
#[derive(Debug, Default)]
pub struct SerializationGate {
    lock: Mutex<()>,
}

struct GateGuard<'a> {
    _held: MutexGuard<'a, ()>,
    operation: &'a str,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        info!(operation = self.operation, "Mutex released for {}", self.operation);
    }
}

impl SerializationGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` while holding the gate.
    ///
    /// The gate is released when the operation finishes, fails, panics or is dropped.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        info!(operation, "Attempting to acquire mutex for {operation}");
        let _guard = GateGuard {
            _held: self.lock.lock().await,
            operation,
        };
        info!(operation, "Mutex acquired for {operation}");
        fut.await
    }

    /// True when no operation holds the gate.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock.try_lock().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn operations_never_overlap() {
        let gate = Arc::new(SerializationGate::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    gate.run("test", async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(gate.is_idle());
    }

    #[tokio::test]
    async fn released_after_error() {
        let gate = SerializationGate::new();
        let result: Result<(), &str> = gate.run("failing", async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(gate.is_idle());
    }

    #[tokio::test]
    async fn released_when_cancelled() {
        let gate = Arc::new(SerializationGate::new());
        let held = gate.clone();
        let task = tokio::spawn(async move {
            held.run("stuck", std::future::pending::<()>()).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!gate.is_idle());

        task.abort();
        let _ = task.await;
        assert!(gate.is_idle());
    }

    #[tokio::test]
    async fn released_after_panic() {
        let gate = Arc::new(SerializationGate::new());
        let held = gate.clone();
        let result = tokio::spawn(async move {
            held.run("panicking", async { panic!("operation panicked") })
                .await
        })
        .await;
        assert!(result.is_err());
        assert!(gate.is_idle());
    }
}
