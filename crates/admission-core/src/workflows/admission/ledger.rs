//! Capacity ledger: the single source of truth for how much of each course,
//! exam schedule, or enrollment schedule is left, and the only component
//! permitted to mutate those counters.
//!
//! Every row carries its own lock so that check-then-reserve is serialized
//! per resource instance: two reservations racing for the last unit are
//! strictly ordered, and the loser observes the winner's increment before
//! its own admission check. Operations touching two rows (transfers) acquire
//! both locks in ascending [`ResourceKey`] order regardless of which row is
//! the source, so opposing reassignments cannot deadlock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{CapacitySnapshot, ResourceId, ResourceKey, ResourceKind, ResourceSpec};

/// Errors raised by ledger operations. `Contended` is the only retryable
/// kind; everything else is a hard failure for the caller to surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{} '{}' not found", kind.label(), id.0)]
    NotFound { kind: ResourceKind, id: ResourceId },
    #[error("{} '{}' is already defined", kind.label(), id.0)]
    AlreadyDefined { kind: ResourceKind, id: ResourceId },
    #[error("{} '{}' has no remaining capacity ({used}/{capacity})", kind.label(), id.0)]
    CapacityExceeded {
        kind: ResourceKind,
        id: ResourceId,
        capacity: u32,
        used: u32,
    },
    #[error(
        "new capacity {requested} for {} '{}' cannot be less than the {committed} already committed",
        kind.label(),
        id.0
    )]
    CapacityReduction {
        kind: ResourceKind,
        id: ResourceId,
        requested: u32,
        committed: u32,
    },
    #[error("{} '{}' is inactive and cannot accept reservations", kind.label(), id.0)]
    Inactive { kind: ResourceKind, id: ResourceId },
    #[error("cannot remove {} '{}': {committed} committed assignments remain", kind.label(), id.0)]
    InUse {
        kind: ResourceKind,
        id: ResourceId,
        committed: u32,
    },
    #[error("{} '{}' is locked by a concurrent operation; retry", kind.label(), id.0)]
    Contended { kind: ResourceKind, id: ResourceId },
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contended { .. })
    }
}

/// Proof of a successful atomic reservation against one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub key: ResourceKey,
    pub amount: u32,
}

/// Counter mutation kinds recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Reserve,
    Release,
}

/// Immutable audit row written for every counter mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAuditEntry {
    pub key: ResourceKey,
    pub action: LedgerAction,
    pub amount: u32,
    pub used_after: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot of a whole row: metadata plus counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    pub key: ResourceKey,
    pub spec: ResourceSpec,
    pub capacity: u32,
    pub used: u32,
    pub active: bool,
}

impl ResourceState {
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.used)
    }
}

#[derive(Debug)]
struct ResourceRow {
    spec: ResourceSpec,
    capacity: u32,
    used: u32,
    active: bool,
}

/// In-memory ledger with one lock per resource row and a bounded lock
/// acquisition timeout.
pub struct CapacityLedger {
    rows: RwLock<BTreeMap<ResourceKey, Arc<Mutex<ResourceRow>>>>,
    audit: Mutex<Vec<LedgerAuditEntry>>,
    lock_timeout: Duration,
}

impl CapacityLedger {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            audit: Mutex::new(Vec::new()),
            lock_timeout,
        }
    }

    /// Register a new resource row with zero usage.
    pub fn define(
        &self,
        id: impl Into<String>,
        spec: ResourceSpec,
        capacity: u32,
    ) -> Result<ResourceKey, LedgerError> {
        let key = ResourceKey::new(spec.kind(), id);
        let mut rows = self.rows.write().expect("ledger registry poisoned");
        if rows.contains_key(&key) {
            return Err(LedgerError::AlreadyDefined {
                kind: key.kind,
                id: key.id.clone(),
            });
        }
        rows.insert(
            key.clone(),
            Arc::new(Mutex::new(ResourceRow {
                spec,
                capacity,
                used: 0,
                active: true,
            })),
        );
        Ok(key)
    }

    /// Atomically check headroom and commit one reservation.
    pub fn reserve(&self, key: &ResourceKey, amount: u32) -> Result<Reservation, LedgerError> {
        let row = self.row(key)?;
        let mut guard = self.lock_row(&row, key)?;
        if !guard.active {
            return Err(LedgerError::Inactive {
                kind: key.kind,
                id: key.id.clone(),
            });
        }
        if guard.used + amount > guard.capacity {
            return Err(LedgerError::CapacityExceeded {
                kind: key.kind,
                id: key.id.clone(),
                capacity: guard.capacity,
                used: guard.used,
            });
        }
        guard.used += amount;
        self.record(key, LedgerAction::Reserve, amount, guard.used);
        Ok(Reservation {
            key: key.clone(),
            amount,
        })
    }

    /// Return a reserved unit. Floors at zero so a duplicated cancellation
    /// cannot drive the counter negative.
    pub fn release(&self, key: &ResourceKey, amount: u32) -> Result<(), LedgerError> {
        let row = self.row(key)?;
        let mut guard = self.lock_row(&row, key)?;
        guard.used = guard.used.saturating_sub(amount);
        let used_after = guard.used;
        drop(guard);
        self.record(key, LedgerAction::Release, amount, used_after);
        Ok(())
    }

    /// Move a reservation between two rows of the same kind as one atomic
    /// step: the destination is checked and incremented before the source is
    /// decremented, so a full destination leaves the source untouched.
    pub fn transfer(
        &self,
        from: &ResourceKey,
        to: &ResourceKey,
        amount: u32,
    ) -> Result<(), LedgerError> {
        if from == to {
            return Ok(());
        }
        let from_row = self.row(from)?;
        let to_row = self.row(to)?;

        // Fixed total order on keys, regardless of source/destination role.
        let (mut first_guard, mut second_guard) = if from < to {
            let f = self.lock_row(&from_row, from)?;
            let t = self.lock_row(&to_row, to)?;
            (f, t)
        } else {
            let t = self.lock_row(&to_row, to)?;
            let f = self.lock_row(&from_row, from)?;
            (f, t)
        };
        let (src, dst) = (&mut first_guard, &mut second_guard);

        if !dst.active {
            return Err(LedgerError::Inactive {
                kind: to.kind,
                id: to.id.clone(),
            });
        }
        if dst.used + amount > dst.capacity {
            return Err(LedgerError::CapacityExceeded {
                kind: to.kind,
                id: to.id.clone(),
                capacity: dst.capacity,
                used: dst.used,
            });
        }
        dst.used += amount;
        src.used = src.used.saturating_sub(amount);
        self.record(to, LedgerAction::Reserve, amount, dst.used);
        self.record(from, LedgerAction::Release, amount, src.used);
        Ok(())
    }

    /// Read-only counter snapshot for reporting.
    pub fn capacity_of(&self, key: &ResourceKey) -> Result<CapacitySnapshot, LedgerError> {
        let row = self.row(key)?;
        let guard = self.lock_row(&row, key)?;
        Ok(CapacitySnapshot::new(guard.capacity, guard.used))
    }

    /// Full row snapshot, including metadata.
    pub fn state_of(&self, key: &ResourceKey) -> Result<ResourceState, LedgerError> {
        let row = self.row(key)?;
        let guard = self.lock_row(&row, key)?;
        Ok(ResourceState {
            key: key.clone(),
            spec: guard.spec.clone(),
            capacity: guard.capacity,
            used: guard.used,
            active: guard.active,
        })
    }

    /// Snapshots of every row of one kind, in key order.
    pub fn states_of_kind(&self, kind: ResourceKind) -> Result<Vec<ResourceState>, LedgerError> {
        let handles: Vec<(ResourceKey, Arc<Mutex<ResourceRow>>)> = {
            let rows = self.rows.read().expect("ledger registry poisoned");
            rows.iter()
                .filter(|(key, _)| key.kind == kind)
                .map(|(key, row)| (key.clone(), Arc::clone(row)))
                .collect()
        };

        let mut states = Vec::with_capacity(handles.len());
        for (key, row) in handles {
            let guard = self.lock_row(&row, &key)?;
            states.push(ResourceState {
                key: key.clone(),
                spec: guard.spec.clone(),
                capacity: guard.capacity,
                used: guard.used,
                active: guard.active,
            });
        }
        Ok(states)
    }

    /// Change a row's capacity. Growing is always allowed; shrinking below
    /// the committed usage is rejected, naming the committed count.
    pub fn update_capacity(&self, key: &ResourceKey, capacity: u32) -> Result<(), LedgerError> {
        let row = self.row(key)?;
        let mut guard = self.lock_row(&row, key)?;
        if capacity < guard.used {
            return Err(LedgerError::CapacityReduction {
                kind: key.kind,
                id: key.id.clone(),
                requested: capacity,
                committed: guard.used,
            });
        }
        guard.capacity = capacity;
        Ok(())
    }

    /// Activate or deactivate a row. Inactive rows keep their counters but
    /// refuse new reservations.
    pub fn set_active(&self, key: &ResourceKey, active: bool) -> Result<(), LedgerError> {
        let row = self.row(key)?;
        let mut guard = self.lock_row(&row, key)?;
        guard.active = active;
        Ok(())
    }

    /// Remove a row. Rejected while any committed assignment remains.
    pub fn remove(&self, key: &ResourceKey) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().expect("ledger registry poisoned");
        let row = rows.get(key).cloned().ok_or_else(|| LedgerError::NotFound {
            kind: key.kind,
            id: key.id.clone(),
        })?;
        {
            let guard = self.lock_row(&row, key)?;
            if guard.used > 0 {
                return Err(LedgerError::InUse {
                    kind: key.kind,
                    id: key.id.clone(),
                    committed: guard.used,
                });
            }
        }
        rows.remove(key);
        Ok(())
    }

    /// Audit rows for one resource, oldest first.
    pub fn audit_for(&self, key: &ResourceKey) -> Vec<LedgerAuditEntry> {
        self.audit
            .lock()
            .expect("ledger audit poisoned")
            .iter()
            .filter(|entry| &entry.key == key)
            .cloned()
            .collect()
    }

    fn row(&self, key: &ResourceKey) -> Result<Arc<Mutex<ResourceRow>>, LedgerError> {
        let rows = self.rows.read().expect("ledger registry poisoned");
        rows.get(key).cloned().ok_or_else(|| LedgerError::NotFound {
            kind: key.kind,
            id: key.id.clone(),
        })
    }

    /// Acquire a row lock within the configured timeout, failing with the
    /// retryable `Contended` error instead of blocking indefinitely.
    fn lock_row<'a>(
        &self,
        row: &'a Arc<Mutex<ResourceRow>>,
        key: &ResourceKey,
    ) -> Result<MutexGuard<'a, ResourceRow>, LedgerError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match row.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                    return Ok(poisoned.into_inner())
                }
                Err(std::sync::TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(LedgerError::Contended {
                            kind: key.kind,
                            id: key.id.clone(),
                        });
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    fn record(&self, key: &ResourceKey, action: LedgerAction, amount: u32, used_after: u32) {
        self.audit
            .lock()
            .expect("ledger audit poisoned")
            .push(LedgerAuditEntry {
                key: key.clone(),
                action,
                amount,
                used_after,
                recorded_at: Utc::now(),
            });
    }
}
