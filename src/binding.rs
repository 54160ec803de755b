//! Display-slot bindings and cooperative cancellation.
//!
//! A slot is the caller's mutable display target. At most one task claims a
//! slot at a time; rebinding replaces the claim and tells the previous owner
//! to stop. Tasks keep only a weak reference to the slot and compare their
//! ticket by identity at completion time, so a completion for a slot that
//! moved on is silently dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Shared cooperative cancellation token. Marking a token stopped never
/// blocks and never interrupts in-flight I/O; workers poll it at defined
/// checkpoints.
#[derive(Clone, Default)]
pub struct CancelToken {
    stopped: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// One task's claim on a slot: the source it serves plus its stop token.
pub struct TaskTicket {
    source: String,
    stop: CancelToken,
}

impl TaskTicket {
    pub fn new(source: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            source: source.into(),
            stop: CancelToken::new(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

struct SlotState {
    current: Mutex<Option<Arc<TaskTicket>>>,
}

/// A display target that loads bind to. Cheap to clone; clones address the
/// same slot.
#[derive(Clone)]
pub struct DisplaySlot {
    state: Arc<SlotState>,
}

impl Default for DisplaySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySlot {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SlotState {
                current: Mutex::new(None),
            }),
        }
    }

    /// Decide whether a new load for `source` should proceed.
    ///
    /// Returns `false` when the slot's current task already serves the same
    /// source and has not been stopped; the existing work will satisfy the
    /// request. Otherwise any current task is stopped and `true` is
    /// returned so the caller schedules fresh work.
    pub fn bind_decision(&self, source: &str) -> bool {
        let guard = self.state.current.lock();
        if let Some(ticket) = guard.as_ref() {
            if ticket.source().eq_ignore_ascii_case(source) && !ticket.is_stopped() {
                return false;
            }
            ticket.stop();
        }
        true
    }

    /// Claim the slot for a ticket, replacing any previous claim.
    pub fn bind(&self, ticket: Arc<TaskTicket>) {
        *self.state.current.lock() = Some(ticket);
    }

    /// Release the slot, stopping whatever task held it.
    pub fn clear(&self) {
        if let Some(ticket) = self.state.current.lock().take() {
            ticket.stop();
        }
    }

    /// Weak reference for tasks to carry.
    pub fn downgrade(&self) -> SlotRef {
        SlotRef {
            state: Arc::downgrade(&self.state),
        }
    }
}

/// Non-owning reference from a task back to its slot.
#[derive(Clone)]
pub struct SlotRef {
    state: Weak<SlotState>,
}

impl SlotRef {
    /// The slot, if it is still alive and still bound to `ticket` and the
    /// ticket has not been stopped. Completion paths call this immediately
    /// before mutating anything slot-visible.
    pub fn attached(&self, ticket: &Arc<TaskTicket>) -> Option<DisplaySlot> {
        let state = self.state.upgrade()?;
        {
            let guard = state.current.lock();
            match guard.as_ref() {
                Some(current) if Arc::ptr_eq(current, ticket) && !ticket.is_stopped() => {}
                _ => return None,
            }
        }
        Some(DisplaySlot { state })
    }
}
