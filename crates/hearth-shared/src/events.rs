//! Change notifications for presentation layers.
//!
//! Every committed mutation produces one or more [`ChangeEvent`]s.  Delivery
//! is at-least-once, so consumers must treat a repeated event as a plain
//! re-render trigger.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ChatId, FriendRequestId, InviteId, MessageId, UserId, UserPair};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Friendship,
    FriendRequest,
    Block,
    Chat,
    Membership,
    Invite,
    Message,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Identifier of the changed entity.  Friendships and blocks have no id of
/// their own and are addressed by the user pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityId {
    User(UserId),
    Pair(UserPair),
    FriendRequest(FriendRequestId),
    Chat(ChatId),
    Invite(InviteId),
    Message(MessageId),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub id: EntityId,
    pub change: ChangeKind,
}

impl ChangeEvent {
    pub fn new(entity: EntityKind, id: EntityId, change: ChangeKind) -> Self {
        Self { entity, id, change }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink poisoned")]
    Poisoned,
}

/// Receiver of change events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ChangeEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps events in memory until drained.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(event.clone());
        Ok(())
    }
}

/// Writes one JSON object per line, e.g. into a pipe read by a UI process.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Deliver `events` to `sink`, logging failures instead of propagating them.
pub fn emit_all(sink: &dyn EventSink, events: &[ChangeEvent]) {
    for event in events {
        if let Err(e) = sink.emit(event) {
            tracing::warn!(entity = ?event.entity, change = ?event.change, error = %e, "Failed to emit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_drains() {
        let sink = RecordingSink::new();
        let event = ChangeEvent::new(
            EntityKind::Chat,
            EntityId::Chat(ChatId::new()),
            ChangeKind::Created,
        );
        emit_all(&sink, &[event.clone(), event.clone()]);
        assert_eq!(sink.take(), vec![event.clone(), event]);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        let id = MessageId::new();
        sink.emit(&ChangeEvent::new(
            EntityKind::Message,
            EntityId::Message(id),
            ChangeKind::Deleted,
        ))
        .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["entity"], "message");
        assert_eq!(value["change"], "deleted");
        assert_eq!(value["id"]["type"], "message");
        assert_eq!(value["id"]["id"], id.0.to_string());
    }
}
