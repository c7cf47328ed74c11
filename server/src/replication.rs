//! Server-owned replicated state and the request/broadcast channel built
//! around it.
//!
//! A field is declared once with an initial value. Every later mutation made
//! through [`ReplicationChannel::set_field`] synchronously runs the registered
//! listeners and queues `(name, old, new)` for each member of the replication
//! group, in the order the mutations happened on the server.
//!
//! Client traffic enters through [`ReplicationChannel::on_client_request`]
//! only. The channel does not look at payloads; whoever drains the queue is
//! responsible for validating them. Requests from connections that are not
//! (or no longer) members are dropped on arrival, and queued requests of a
//! connection that leaves are discarded with it.

use log::debug;
use shared::{ClientRequest, ConnectionId, FieldChange, FieldValue, ServerBroadcast};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq)]
pub enum ReplicationError {
    #[error("field `{0}` is already declared")]
    DuplicateField(String),
    #[error("field `{0}` was never declared")]
    UnknownField(String),
}

/// A message addressed to one connection, consumed by the network sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub connection_id: ConnectionId,
    pub message: ServerBroadcast,
}

pub type FieldListener = Box<dyn FnMut(&FieldChange) + Send>;

pub struct ReplicationChannel {
    /// Declared fields in declaration order.
    fields: Vec<(String, FieldValue)>,
    group: BTreeSet<ConnectionId>,
    pending: VecDeque<(ConnectionId, ClientRequest)>,
    listeners: Vec<FieldListener>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ReplicationChannel {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            fields: Vec::new(),
            group: BTreeSet::new(),
            pending: VecDeque::new(),
            listeners: Vec::new(),
            outbound,
        }
    }

    pub fn declare_field(
        &mut self,
        name: &str,
        initial: FieldValue,
    ) -> Result<(), ReplicationError> {
        if self.fields.iter().any(|(n, _)| n == name) {
            return Err(ReplicationError::DuplicateField(name.to_string()));
        }
        self.fields.push((name.to_string(), initial));
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    /// Registers a listener invoked synchronously after every field mutation.
    pub fn on_field_change<F>(&mut self, listener: F)
    where
        F: FnMut(&FieldChange) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Mutates a field. Returns `Ok(false)` when the value is unchanged, in
    /// which case nothing is broadcast.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<bool, ReplicationError> {
        let slot = self
            .fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ReplicationError::UnknownField(name.to_string()))?;

        if slot.1 == value {
            return Ok(false);
        }

        let change = FieldChange {
            name: name.to_string(),
            old: slot.1,
            new: value,
        };
        slot.1 = value;

        for listener in &mut self.listeners {
            listener(&change);
        }
        self.broadcast(ServerBroadcast::FieldChanged(change));
        Ok(true)
    }

    /// Adds a connection to the replication group and sends it the current
    /// value of every declared field.
    pub fn join(&mut self, connection_id: ConnectionId) {
        if !self.group.insert(connection_id) {
            return;
        }
        for (name, value) in &self.fields {
            let change = FieldChange {
                name: name.clone(),
                old: *value,
                new: *value,
            };
            Self::send(
                &self.outbound,
                connection_id,
                ServerBroadcast::FieldChanged(change),
            );
        }
    }

    /// Prunes a connection. Its queued requests are discarded and nothing
    /// further is sent to it.
    pub fn leave(&mut self, connection_id: ConnectionId) -> bool {
        let removed = self.group.remove(&connection_id);
        self.pending.retain(|(id, _)| *id != connection_id);
        removed
    }

    pub fn is_member(&self, connection_id: ConnectionId) -> bool {
        self.group.contains(&connection_id)
    }

    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.group.iter().copied()
    }

    pub fn member_count(&self) -> usize {
        self.group.len()
    }

    /// Fans a one-way message out to every member.
    pub fn broadcast(&self, message: ServerBroadcast) {
        for &connection_id in &self.group {
            Self::send(&self.outbound, connection_id, message.clone());
        }
    }

    /// Sends to a single member. Non-members are ignored.
    pub fn unicast(&self, connection_id: ConnectionId, message: ServerBroadcast) {
        if self.group.contains(&connection_id) {
            Self::send(&self.outbound, connection_id, message);
        }
    }

    /// Single entry point for client-to-server messages. Returns whether the
    /// request was queued.
    pub fn on_client_request(
        &mut self,
        connection_id: ConnectionId,
        request: ClientRequest,
    ) -> bool {
        if !self.group.contains(&connection_id) {
            debug!(
                "Dropping request from non-member connection {}",
                connection_id
            );
            return false;
        }
        self.pending.push_back((connection_id, request));
        true
    }

    /// Takes every queued request in arrival order.
    pub fn drain_requests(&mut self) -> Vec<(ConnectionId, ClientRequest)> {
        self.pending.drain(..).collect()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn send(
        outbound: &mpsc::UnboundedSender<Outbound>,
        connection_id: ConnectionId,
        message: ServerBroadcast,
    ) {
        if outbound
            .send(Outbound {
                connection_id,
                message,
            })
            .is_err()
        {
            debug!("Outbound queue closed, dropping message for {}", connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::GameEvent;
    use std::sync::{Arc, Mutex};

    fn channel() -> (ReplicationChannel, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ReplicationChannel::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_declare_and_read_field() {
        let (mut channel, _rx) = channel();
        channel.declare_field("score", FieldValue::Uint(0)).unwrap();
        assert_eq!(channel.field("score"), Some(FieldValue::Uint(0)));
        assert_eq!(channel.field("missing"), None);
        assert_eq!(
            channel.declare_field("score", FieldValue::Uint(1)),
            Err(ReplicationError::DuplicateField("score".to_string()))
        );
    }

    #[test]
    fn test_set_unknown_field_fails() {
        let (mut channel, _rx) = channel();
        assert_eq!(
            channel.set_field("nope", FieldValue::Bool(true)),
            Err(ReplicationError::UnknownField("nope".to_string()))
        );
    }

    #[test]
    fn test_mutation_broadcasts_old_and_new_to_each_member_in_order() {
        let (mut channel, mut rx) = channel();
        channel.declare_field("score", FieldValue::Uint(0)).unwrap();
        channel.join(1);
        channel.join(2);
        drain(&mut rx);

        channel.set_field("score", FieldValue::Uint(1)).unwrap();
        channel.set_field("score", FieldValue::Uint(2)).unwrap();

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 4);
        let for_one: Vec<_> = sent.iter().filter(|o| o.connection_id == 1).collect();
        match (&for_one[0].message, &for_one[1].message) {
            (ServerBroadcast::FieldChanged(first), ServerBroadcast::FieldChanged(second)) => {
                assert_eq!(first.old, FieldValue::Uint(0));
                assert_eq!(first.new, FieldValue::Uint(1));
                assert_eq!(second.old, FieldValue::Uint(1));
                assert_eq!(second.new, FieldValue::Uint(2));
            }
            _ => panic!("Unexpected broadcast type"),
        }
    }

    #[test]
    fn test_unchanged_value_is_not_broadcast() {
        let (mut channel, mut rx) = channel();
        channel.declare_field("active", FieldValue::Bool(true)).unwrap();
        channel.join(1);
        drain(&mut rx);

        assert_eq!(channel.set_field("active", FieldValue::Bool(true)), Ok(false));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_listeners_run_synchronously() {
        let (mut channel, _rx) = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.on_field_change(move |change| sink.lock().unwrap().push(change.new));
        channel.declare_field("y", FieldValue::Float(0.0)).unwrap();

        channel.set_field("y", FieldValue::Float(1.5)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![FieldValue::Float(1.5)]);
    }

    #[test]
    fn test_join_sends_current_values() {
        let (mut channel, mut rx) = channel();
        channel.declare_field("a", FieldValue::Uint(3)).unwrap();
        channel.declare_field("b", FieldValue::Bool(false)).unwrap();
        channel.join(5);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|o| o.connection_id == 5));
        match &sent[0].message {
            ServerBroadcast::FieldChanged(change) => {
                assert_eq!(change.name, "a");
                assert_eq!(change.old, change.new);
            }
            _ => panic!("Unexpected broadcast type"),
        }
    }

    #[test]
    fn test_pruned_connection_receives_nothing() {
        let (mut channel, mut rx) = channel();
        channel.join(1);
        channel.join(2);
        assert!(channel.leave(2));
        assert!(!channel.leave(2));

        channel.broadcast(ServerBroadcast::Event(GameEvent::MatchReset));
        channel.unicast(2, ServerBroadcast::Event(GameEvent::MatchReset));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].connection_id, 1);
    }

    #[test]
    fn test_requests_from_non_members_are_dropped() {
        let (mut channel, _rx) = channel();
        channel.join(1);
        assert!(channel.on_client_request(1, ClientRequest::VoteRestart));
        assert!(!channel.on_client_request(9, ClientRequest::VoteRestart));
        assert_eq!(channel.pending_requests(), 1);
    }

    #[test]
    fn test_leave_discards_queued_requests() {
        let (mut channel, _rx) = channel();
        channel.join(1);
        channel.join(2);
        channel.on_client_request(1, ClientRequest::MovePaddle { y: 1.0 });
        channel.on_client_request(2, ClientRequest::MovePaddle { y: 2.0 });
        channel.on_client_request(1, ClientRequest::VoteRestart);

        channel.leave(1);
        let drained = channel.drain_requests();
        assert_eq!(drained, vec![(2, ClientRequest::MovePaddle { y: 2.0 })]);
        assert_eq!(channel.pending_requests(), 0);
    }

    #[test]
    fn test_closed_outbound_queue_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut channel = ReplicationChannel::new(tx);
        channel.declare_field("a", FieldValue::Uint(0)).unwrap();
        channel.join(1);
        assert_eq!(channel.set_field("a", FieldValue::Uint(1)), Ok(true));
    }
}
