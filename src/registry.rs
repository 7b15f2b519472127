// Executor registry - allow-list of executor contracts the dispatcher may call.
//
// New registrations only become callable after a safety window of blocks, so a
// compromised setter cannot route funds through a fresh executor in the same block.

use std::sync::Mutex;

use dashmap::{DashMap, DashSet};
use ethers::types::Address;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::metrics;

/// Default activation delay, in blocks.
pub const DEFAULT_SAFETY_WINDOW: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{caller:?} does not hold the executor-setter role")]
    Unauthorized { caller: Address },
    #[error("executor {0:?} was never registered")]
    UnknownExecutor(Address),
    #[error("executor {0:?} is not approved")]
    NotApproved(Address),
    #[error("executor {executor:?} activates at block {activation_block}, current block is {current_block}")]
    NotActivated {
        executor: Address,
        activation_block: u64,
        current_block: u64,
    },
    #[error("the zero address cannot be registered")]
    ZeroAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutorRecord {
    pub approved: bool,
    pub activation_block: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegistryEvent {
    ExecutorRegistered { executor: Address, activation_block: u64 },
    ExecutorRemoved { executor: Address },
    SetterGranted { setter: Address },
}

/// Shared registry. Reads are lock-free; the dispatcher consults it at every hop.
pub struct ExecutorRegistry {
    admin: Address,
    setters: DashSet<Address>,
    records: DashMap<Address, ExecutorRecord>,
    safety_window: u64,
    events: Mutex<Vec<RegistryEvent>>,
}

impl ExecutorRegistry {
    pub fn new(admin: Address, safety_window: u64) -> Self {
        let setters = DashSet::new();
        setters.insert(admin);
        Self {
            admin,
            setters,
            records: DashMap::new(),
            safety_window,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn safety_window(&self) -> u64 {
        self.safety_window
    }

    /// Gives `setter` the right to register and remove executors. Admin only.
    pub fn grant_setter(&self, caller: Address, setter: Address) -> Result<(), RegistryError> {
        if caller != self.admin {
            warn!("rejected setter grant from {:?}", caller);
            return Err(RegistryError::Unauthorized { caller });
        }
        if setter.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        self.setters.insert(setter);
        self.emit(RegistryEvent::SetterGranted { setter });
        Ok(())
    }

    pub fn is_setter(&self, who: Address) -> bool {
        self.setters.contains(&who)
    }

    /// Approves `executors`, callable from `current_block + safety_window` on.
    /// Re-registering restarts the window.
    pub fn register(&self, caller: Address, executors: &[Address], current_block: u64) -> Result<(), RegistryError> {
        self.authorize(caller)?;
        if executors.iter().any(Address::is_zero) {
            return Err(RegistryError::ZeroAddress);
        }
        let activation_block = current_block.saturating_add(self.safety_window);
        for executor in executors {
            self.records.insert(
                *executor,
                ExecutorRecord {
                    approved: true,
                    activation_block: Some(activation_block),
                },
            );
            info!(
                "registered executor {:?}, active from block {}",
                executor, activation_block
            );
            self.emit(RegistryEvent::ExecutorRegistered {
                executor: *executor,
                activation_block,
            });
            metrics::record_registry_change("registered");
        }
        Ok(())
    }

    /// Revokes `executor` immediately. Removing an address that was never
    /// registered leaves no record behind but still emits the event.
    pub fn remove(&self, caller: Address, executor: Address) -> Result<(), RegistryError> {
        self.authorize(caller)?;
        match self.records.get_mut(&executor) {
            Some(mut record) => {
                record.approved = false;
                record.activation_block = None;
                info!("removed executor {:?}", executor);
            }
            None => warn!("removing unregistered executor {:?}", executor),
        }
        self.emit(RegistryEvent::ExecutorRemoved { executor });
        metrics::record_registry_change("removed");
        Ok(())
    }

    pub fn record(&self, executor: Address) -> Option<ExecutorRecord> {
        self.records.get(&executor).map(|entry| *entry)
    }

    /// Succeeds when `executor` is approved and its activation block has been reached.
    pub fn check(&self, executor: Address, block: u64) -> Result<(), RegistryError> {
        let record = self
            .record(executor)
            .ok_or(RegistryError::UnknownExecutor(executor))?;
        if !record.approved {
            return Err(RegistryError::NotApproved(executor));
        }
        match record.activation_block {
            Some(activation_block) if activation_block <= block => Ok(()),
            Some(activation_block) => Err(RegistryError::NotActivated {
                executor,
                activation_block,
                current_block: block,
            }),
            None => Err(RegistryError::NotApproved(executor)),
        }
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn authorize(&self, caller: Address) -> Result<(), RegistryError> {
        if self.is_setter(caller) {
            Ok(())
        } else {
            warn!("rejected registry change from {:?}", caller);
            Err(RegistryError::Unauthorized { caller })
        }
    }

    fn emit(&self, event: RegistryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("admin", &self.admin)
            .field("executors", &self.records.len())
            .field("safety_window", &self.safety_window)
            .finish()
    }
}
