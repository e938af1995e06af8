//! Single-flight guard for document mutations.
//!
//! A second mutation of a document that is already being mutated fails fast
//! instead of queueing behind the first one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use procureflow_core::{AggregateId, BusinessId};

use crate::engine::EngineError;

type Key = (BusinessId, AggregateId);

#[derive(Debug, Default, Clone)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<Key>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(business, document)`. The claim is released when the ticket drops.
    pub fn try_acquire(
        &self,
        business_id: BusinessId,
        document_id: &AggregateId,
    ) -> Result<InFlightTicket, EngineError> {
        let key = (business_id, document_id.clone());
        let mut active = self
            .active
            .lock()
            .map_err(|_| EngineError::Infrastructure("in-flight registry poisoned".to_string()))?;

        if !active.insert(key.clone()) {
            return Err(EngineError::ConcurrencyConflict(format!(
                "{document_id} is already being updated"
            )));
        }

        Ok(InFlightTicket {
            active: Arc::clone(&self.active),
            key,
        })
    }

    pub fn is_active(&self, business_id: BusinessId, document_id: &AggregateId) -> bool {
        self.active
            .lock()
            .map(|a| a.contains(&(business_id, document_id.clone())))
            .unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct InFlightTicket {
    active: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.key);
        }
    }
}
