// Post-settlement hook queue.
//
// Reconciliation sometimes has follow-up work that must not run before the
// ledger writes are durable (notification emails, analytics events). Handlers
// queue closures here during settlement; the queue drains after the writes
// commit. Hooks are fire-and-forget: a failing hook logs and never unwinds a
// settled payment.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

type BoxFuture = Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
type Hook = Box<dyn FnOnce() -> BoxFuture + Send + Sync>;

/// Queue of hooks to run after a settlement's ledger writes commit.
#[derive(Clone)]
pub struct SettlementQueue {
    pending: Arc<Mutex<Vec<Hook>>>,
}

impl SettlementQueue {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a hook to run after the current settlement commits.
    pub async fn queue<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock().await;
        pending.push(Box::new(move || Box::pin(hook()) as BoxFuture));
    }

    /// Run and clear all pending hooks.
    pub async fn drain(&self) {
        let hooks: Vec<Hook> = {
            let mut guard = self.pending.lock().await;
            std::mem::take(&mut *guard)
        };
        for hook in hooks {
            hook().await;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for SettlementQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SettlementQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementQueue")
            .field("pending", &"[...]")
            .finish()
    }
}
