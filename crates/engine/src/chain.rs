//! Thread-scoped execution trace.
//!
//! Every invocation that occurs while handling one logical request on a
//! thread appends its outcome record to that thread's [`Chain`]. The chain
//! is created lazily by the first invocation, grows append-only, and is
//! discarded with the thread or cleared explicitly between requests. Two
//! threads never share a chain, so no locking is required between them; the
//! handle itself is internally synchronized so records can keep a reference
//! to their chain across threads.
//!
//! A slot is reserved when an invocation enters execution and filled when it
//! finalizes, so an outer invocation (a workflow) always sits before the
//! members it ran, and the first slot anchors the chain's reported
//! state/status regardless of later entries.

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use operon_types::{ExecutionState, ExecutionStatus};
use uuid::Uuid;

use crate::result::TaskResult;

thread_local! {
    static CURRENT: RefCell<Option<Chain>> = const { RefCell::new(None) };
}

struct ChainInner {
    id: String,
    slots: Vec<Option<TaskResult>>,
}

/// Append-only sequence of outcome records for one thread of control.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<Mutex<ChainInner>>,
}

impl Chain {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChainInner {
                id: Uuid::new_v4().to_string(),
                slots: Vec::new(),
            })),
        }
    }

    /// The chain currently bound to this thread, if any invocation has run.
    pub fn current() -> Option<Chain> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Gets or lazily creates the chain for this thread.
    pub(crate) fn obtain() -> Chain {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            current.get_or_insert_with(Chain::new).clone()
        })
    }

    /// Unbinds the chain from this thread. Existing records keep their
    /// handle to the cleared chain.
    pub fn clear() {
        CURRENT.with(|current| current.borrow_mut().take());
    }

    /// Unique identifier of this chain.
    pub fn id(&self) -> String {
        self.inner.lock().expect("chain lock poisoned").id.clone()
    }

    /// Reserves the next position for an invocation that just entered
    /// execution.
    pub(crate) fn reserve(&self) -> usize {
        let mut inner = self.inner.lock().expect("chain lock poisoned");
        inner.slots.push(None);
        inner.slots.len() - 1
    }

    /// Fills a reserved position with the finalized record.
    pub(crate) fn record(&self, index: usize, result: TaskResult) {
        let mut inner = self.inner.lock().expect("chain lock poisoned");
        if let Some(slot) = inner.slots.get_mut(index) {
            *slot = Some(result);
        }
    }

    /// Finalized records in reservation order.
    pub fn results(&self) -> Vec<TaskResult> {
        self.inner
            .lock()
            .expect("chain lock poisoned")
            .slots
            .iter()
            .filter_map(|slot| slot.clone())
            .collect()
    }

    /// Number of finalized records.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("chain lock poisoned")
            .slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// True when no record has finalized yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The outermost record, which anchors the chain's reported
    /// state/status.
    pub fn first(&self) -> Option<TaskResult> {
        self.inner
            .lock()
            .expect("chain lock poisoned")
            .slots
            .first()
            .and_then(|slot| slot.clone())
    }

    /// The chain's reported state: that of its first record.
    pub fn state(&self) -> Option<ExecutionState> {
        self.first().map(|result| result.state())
    }

    /// The chain's reported status: that of its first record.
    pub fn status(&self) -> Option<ExecutionStatus> {
        self.first().map(|result| result.status())
    }

    /// True when two handles point at the same chain.
    pub fn same_as(&self, other: &Chain) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("id", &self.id()).field("len", &self.len()).finish()
    }
}
