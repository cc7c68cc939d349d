//! Process-wide serialization of operations sharing a resource category.
//!
//! The ledger is an explicitly-owned registry, injected into whichever
//! conditions need it. It is never a hidden singleton, so tests can create an
//! isolated ledger per case. At most one lease per category exists at a time;
//! later claimants queue in FIFO order and are granted the slot when the
//! current holder's lease drops.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

use crate::core::operation::OperationId;

struct Waiter {
    owner: OperationId,
    grant: oneshot::Sender<Lease>,
}

#[derive(Default)]
struct CategoryState {
    holder: Option<OperationId>,
    waiters: VecDeque<Waiter>,
}

/// Registry tracking which exclusivity categories are currently held.
///
/// Waiting is expressed as an unresolved future, never a blocked thread:
/// [`acquire`](ExclusivityLedger::acquire) parks the caller until the slot is
/// granted. Dropping a pending acquire future withdraws the claim.
#[derive(Default)]
pub struct ExclusivityLedger {
    categories: Mutex<HashMap<String, CategoryState>>,
}

impl ExclusivityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CategoryState>> {
        self.categories.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the category, waiting until the current holder (if any) releases.
    ///
    /// The returned [`Lease`] releases the category when dropped, exactly once.
    pub async fn acquire(self: &Arc<Self>, category: &str, owner: OperationId) -> Lease {
        let pending = {
            let mut categories = self.lock();
            let state = categories.entry(category.to_string()).or_default();
            match state.holder {
                None => {
                    state.holder = Some(owner);
                    tracing::trace!(category, owner = %owner.short(), "lease granted");
                    None
                }
                Some(_) => {
                    let (grant, rx) = oneshot::channel();
                    state.waiters.push_back(Waiter { owner, grant });
                    tracing::trace!(category, owner = %owner.short(), "queued for lease");
                    Some(rx)
                }
            }
        };

        match pending {
            None => Lease::live(Arc::clone(self), category),
            Some(rx) => match rx.await {
                Ok(lease) => lease,
                // The ledger dropped the waiter without granting; nothing to
                // release on drop.
                Err(_) => Lease::defused(Arc::clone(self), category),
            },
        }
    }

    /// Whether any operation currently holds the category.
    pub fn is_held(&self, category: &str) -> bool {
        self.lock()
            .get(category)
            .map(|state| state.holder.is_some())
            .unwrap_or(false)
    }

    /// Number of operations queued behind the current holder.
    pub fn waiting(&self, category: &str) -> usize {
        self.lock()
            .get(category)
            .map(|state| state.waiters.len())
            .unwrap_or(0)
    }

    fn release(self: &Arc<Self>, category: &str) {
        let mut categories = self.lock();
        let Some(state) = categories.get_mut(category) else {
            return;
        };
        loop {
            match state.waiters.pop_front() {
                Some(waiter) => {
                    let lease = Lease::live(Arc::clone(self), category);
                    match waiter.grant.send(lease) {
                        Ok(()) => {
                            state.holder = Some(waiter.owner);
                            tracing::trace!(
                                category,
                                owner = %waiter.owner.short(),
                                "lease handed off"
                            );
                            return;
                        }
                        // Waiter withdrew its claim; defuse the returned
                        // lease so its drop does not re-enter the ledger.
                        Err(mut lost) => {
                            lost.released = true;
                            continue;
                        }
                    }
                }
                None => {
                    state.holder = None;
                    tracing::trace!(category, "category released");
                    return;
                }
            }
        }
    }
}

/// Exclusive hold on a category, released exactly once on drop.
pub struct Lease {
    ledger: Arc<ExclusivityLedger>,
    category: String,
    released: bool,
}

impl Lease {
    fn live(ledger: Arc<ExclusivityLedger>, category: &str) -> Self {
        Self {
            ledger,
            category: category.to_string(),
            released: false,
        }
    }

    fn defused(ledger: Arc<ExclusivityLedger>, category: &str) -> Self {
        Self {
            ledger,
            category: category.to_string(),
            released: true,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let ledger = Arc::clone(&self.ledger);
            ledger.release(&self.category);
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("category", &self.category)
            .field("released", &self.released)
            .finish()
    }
}
