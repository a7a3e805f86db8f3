use chrono::{DateTime, Utc};

use hearth_shared::events::{ChangeEvent, ChangeKind, EntityId, EntityKind};

use crate::config::EngineConfig;
use crate::store::WriteOp;

/// Outcome of a successful decision: the summary handed back to the caller,
/// the writes to commit and the events to emit once they are committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<T> {
    pub value: T,
    pub ops: Vec<WriteOp>,
    pub events: Vec<ChangeEvent>,
}

impl<T> Plan<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            ops: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn write(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn event(&mut self, entity: EntityKind, id: EntityId, change: ChangeKind) -> &mut Self {
        self.events.push(ChangeEvent::new(entity, id, change));
        self
    }

    /// Nothing to write: an idempotent repeat of an earlier command.
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Inputs every decision may need besides the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Ctx<'a> {
    pub now: DateTime<Utc>,
    pub config: &'a EngineConfig,
}
