//! Correlation ids for planner request/decision pairs.

use std::sync::atomic::{AtomicU64, Ordering};

use pilot_core_types::ActionId;
use uuid::Uuid;

/// Source of opaque ids, scoped to one agent instance.
pub trait CorrelationIdSource: Send + Sync {
    fn next_id(&self) -> ActionId;
}

/// Random ids in the `toolu_` shape tool-calling services accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdSource;

impl CorrelationIdSource for UuidIdSource {
    fn next_id(&self) -> ActionId {
        ActionId::new(format!("toolu_{}", Uuid::new_v4().simple()))
    }
}

/// Deterministic `prefix0`, `prefix1`, ... ids.
#[derive(Debug)]
pub struct SequentialIdSource {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl CorrelationIdSource for SequentialIdSource {
    fn next_id(&self) -> ActionId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ActionId::new(format!("{}{}", self.prefix, n))
    }
}
