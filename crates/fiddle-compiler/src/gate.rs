//! One-shot readiness barrier for the reference catalog.
//!
//! Continuations registered before the catalog is published run once each,
//! in registration order, when it is published. Continuations registered
//! afterwards run immediately on the caller's thread. Async callers use
//! [`ReadinessGate::ready`] instead.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::diagnostic::CompilerError;
use crate::reference::ReferenceCatalog;

/// Population progress of a session's catalog. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadinessState {
    NotStarted,
    InProgress,
    Ready,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReadinessState::NotStarted => "not started",
            ReadinessState::InProgress => "in progress",
            ReadinessState::Ready => "ready",
        };
        f.write_str(text)
    }
}

type Continuation = Box<dyn FnOnce(&Arc<ReferenceCatalog>) + Send>;

struct GateInner {
    state: ReadinessState,
    pending: Vec<Continuation>,
    catalog: Option<Arc<ReferenceCatalog>>,
}

pub struct ReadinessGate {
    inner: Mutex<GateInner>,
    published: watch::Sender<Option<Arc<ReferenceCatalog>>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (published, _) = watch::channel(None);
        Self {
            inner: Mutex::new(GateInner {
                state: ReadinessState::NotStarted,
                pending: Vec::new(),
                catalog: None,
            }),
            published,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ReadinessState {
        self.lock().state
    }

    /// The published catalog, if any.
    pub fn catalog(&self) -> Option<Arc<ReferenceCatalog>> {
        self.lock().catalog.clone()
    }

    /// Moves `NotStarted -> InProgress`. Only the first caller succeeds.
    pub fn begin(&self) -> Result<(), CompilerError> {
        let mut inner = self.lock();
        match inner.state {
            ReadinessState::NotStarted => {
                inner.state = ReadinessState::InProgress;
                Ok(())
            }
            state => Err(CompilerError::AlreadyPopulated { state }),
        }
    }

    /// Publishes the catalog and runs every queued continuation.
    ///
    /// Continuations run after the lock is released, so they may register
    /// further continuations.
    pub fn publish(&self, catalog: ReferenceCatalog) -> Result<Arc<ReferenceCatalog>, CompilerError> {
        let catalog = Arc::new(catalog);
        let pending = {
            let mut inner = self.lock();
            if inner.state == ReadinessState::Ready {
                return Err(CompilerError::AlreadyPopulated { state: inner.state });
            }
            inner.state = ReadinessState::Ready;
            inner.catalog = Some(Arc::clone(&catalog));
            std::mem::take(&mut inner.pending)
        };

        self.published.send_replace(Some(Arc::clone(&catalog)));
        log::debug!("catalog ready, running {} queued continuation(s)", pending.len());
        for continuation in pending {
            continuation(&catalog);
        }
        Ok(catalog)
    }

    /// Runs `continuation` now if ready, otherwise once on publication.
    pub fn on_ready<F>(&self, continuation: F)
    where
        F: FnOnce(&Arc<ReferenceCatalog>) + Send + 'static,
    {
        let catalog = {
            let mut inner = self.lock();
            match &inner.catalog {
                Some(catalog) => Arc::clone(catalog),
                None => {
                    inner.pending.push(Box::new(continuation));
                    return;
                }
            }
        };
        continuation(&catalog);
    }

    /// Resolves with the catalog once it is published.
    pub async fn ready(&self) -> Arc<ReferenceCatalog> {
        let mut receiver = self.published.subscribe();
        loop {
            if let Some(catalog) = receiver.borrow_and_update().as_ref() {
                return Arc::clone(catalog);
            }
            if receiver.changed().await.is_err() {
                // The sender lives as long as `self`; this is unreachable.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ReadinessGate")
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_state_transitions() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.state(), ReadinessState::NotStarted);
        gate.begin().unwrap();
        assert_eq!(gate.state(), ReadinessState::InProgress);
        assert!(matches!(
            gate.begin(),
            Err(CompilerError::AlreadyPopulated { state: ReadinessState::InProgress })
        ));
        gate.publish(ReferenceCatalog::core_only()).unwrap();
        assert_eq!(gate.state(), ReadinessState::Ready);
        assert!(gate.publish(ReferenceCatalog::default()).is_err());
        assert_eq!(gate.catalog().unwrap().len(), 1);
    }

    #[test]
    fn test_queued_continuations_run_once_in_order() {
        let gate = ReadinessGate::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            gate.on_ready(move |_| order.lock().unwrap().push(i));
        }
        assert!(order.lock().unwrap().is_empty());

        gate.begin().unwrap();
        gate.publish(ReferenceCatalog::core_only()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_late_continuation_runs_synchronously() {
        let gate = ReadinessGate::new();
        gate.begin().unwrap();
        gate.publish(ReferenceCatalog::core_only()).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        gate.on_ready(move |catalog| {
            assert_eq!(catalog.len(), 1);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuation_may_register_another() {
        let gate = Arc::new(ReadinessGate::new());
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let gate2 = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            gate.on_ready(move |_| {
                let inner_calls = Arc::clone(&calls);
                gate2.on_ready(move |_| {
                    inner_calls.fetch_add(1, Ordering::SeqCst);
                });
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        gate.begin().unwrap();
        gate.publish(ReferenceCatalog::core_only()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ready_resolves_after_publish() {
        let gate = Arc::new(ReadinessGate::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.ready().await.len() })
            })
            .collect();

        tokio::task::yield_now().await;
        gate.begin().unwrap();
        gate.publish(ReferenceCatalog::core_only()).unwrap();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), 1);
        }
        assert_eq!(gate.ready().await.len(), 1);
    }
}
