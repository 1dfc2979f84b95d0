// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Message Bus - In-process agent-to-agent messaging
//!
//! Each registered agent owns an unbounded FIFO mailbox. Reply-typed
//! messages with a `correlation_id` are responses: they resolve the matching
//! `request()` directly and never land in a mailbox. Unmatched responses are
//! dropped.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use genesis_core::domain::config::MessageBusConfig;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{AgentCard, Message, MessageType};

/// Errors raised by [`MessageBus`] operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    #[error("No response to message {message_id} within {timeout:?}")]
    Timeout { message_id: Uuid, timeout: Duration },

    #[error("No handler set for agent: {0}")]
    NoHandler(String),

    #[error("Request {0} was cancelled before a response arrived")]
    Cancelled(Uuid),

    #[error("Invalid message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handles messages pulled from an agent's mailbox by the message loop.
///
/// Returning `Ok(Some(reply))` sends `reply` back onto the bus. An `Err`
/// makes the loop answer the sender with an `error` message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> anyhow::Result<Option<Message>>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Message>>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> anyhow::Result<Option<Message>> {
        (self)(message).await
    }
}

/// Snapshot of bus occupancy
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub registered_agents: usize,
    pub pending_requests: usize,
    pub queue_depths: BTreeMap<String, usize>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>>;

/// The only sender lives here, so removing the mailbox closes the channel.
struct Mailbox {
    tx: mpsc::UnboundedSender<Message>,
    rx: SharedReceiver,
    depth: Arc<AtomicUsize>,
}

impl Mailbox {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn deliver(&self, message: Message) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(message).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct Inner {
    agents: DashMap<String, AgentCard>,
    mailboxes: DashMap<String, Mailbox>,
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
    pending: DashMap<Uuid, oneshot::Sender<Message>>,
    shutdown: Mutex<CancellationToken>,
    request_timeout: Duration,
}

/// Removes a pending request entry however `request()` exits.
struct PendingGuard<'a> {
    pending: &'a DashMap<Uuid, oneshot::Sender<Message>>,
    message_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.message_id);
    }
}

/// Agent-to-agent message bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl MessageBus {
    pub fn new(config: MessageBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                agents: DashMap::new(),
                mailboxes: DashMap::new(),
                handlers: DashMap::new(),
                pending: DashMap::new(),
                shutdown: Mutex::new(CancellationToken::new()),
                request_timeout: config.request_timeout,
            }),
        }
    }

    /// Register an agent. Re-registering replaces the card and keeps the mailbox.
    pub fn register_agent(&self, card: AgentCard) {
        let agent_id = card.agent_id.clone();
        info!(
            agent_id = %agent_id,
            capabilities = ?card.capabilities,
            "Registered agent"
        );
        self.inner.mailboxes.entry(agent_id.clone()).or_insert_with(Mailbox::new);
        self.inner.agents.insert(agent_id, card);
    }

    /// Remove an agent, its handler and its mailbox. Queued messages are
    /// discarded, including any a running message loop has not reached yet.
    pub fn unregister_agent(&self, agent_id: &str) {
        self.inner.agents.remove(agent_id);
        self.inner.handlers.remove(agent_id);
        if let Some((_, mailbox)) = self.inner.mailboxes.remove(agent_id) {
            info!(
                agent_id = %agent_id,
                discarded = mailbox.depth.load(Ordering::SeqCst),
                "Unregistered agent"
            );
        }
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner.mailboxes.contains_key(agent_id)
    }

    pub fn set_handler<H>(&self, agent_id: &str, handler: H) -> Result<(), BusError>
    where
        H: MessageHandler + 'static,
    {
        if !self.is_registered(agent_id) {
            return Err(BusError::AgentNotRegistered(agent_id.to_string()));
        }
        self.inner.handlers.insert(agent_id.to_string(), Arc::new(handler));
        debug!(agent_id = %agent_id, "Set message handler");
        Ok(())
    }

    /// Route a message.
    ///
    /// Replies correlated to an outstanding `request()` resolve it directly.
    /// Everything else needs a registered receiver (or none, for a broadcast).
    /// Replies whose request is gone are dropped; other correlated types, such
    /// as a `task_cancel` naming an earlier request, are delivered normally.
    pub fn send(&self, message: Message) -> Result<(), BusError> {
        if message.is_response() {
            if let Some(correlation_id) = message.correlation_id {
                if let Some((_, waiter)) = self.inner.pending.remove(&correlation_id) {
                    debug!(
                        message_id = %message.id,
                        correlation_id = %correlation_id,
                        "Resolved pending request"
                    );
                    metrics::counter!("genesis_bus_messages_total", "kind" => "response").increment(1);
                    // The requester may have given up between remove() and here
                    let _ = waiter.send(message);
                    return Ok(());
                }
            }
        }

        if let Some(receiver) = &message.receiver {
            if !self.inner.mailboxes.contains_key(receiver) {
                return Err(BusError::AgentNotRegistered(receiver.clone()));
            }
        }

        if message.is_response() {
            debug!(
                message_id = %message.id,
                message_type = %message.message_type,
                correlation_id = ?message.correlation_id,
                "Dropping response with no pending request"
            );
            metrics::counter!("genesis_bus_correlation_miss_total").increment(1);
            return Ok(());
        }

        match message.receiver.clone() {
            Some(receiver) => {
                let mailbox = self
                    .inner
                    .mailboxes
                    .get(&receiver)
                    .ok_or_else(|| BusError::AgentNotRegistered(receiver.clone()))?;
                debug!(
                    message_id = %message.id,
                    message_type = %message.message_type,
                    sender = %message.sender,
                    receiver = %receiver,
                    "Delivering message"
                );
                mailbox.deliver(message);
                metrics::counter!("genesis_bus_messages_total", "kind" => "direct").increment(1);
            }
            None => {
                let mut delivered = 0usize;
                for mailbox in self.inner.mailboxes.iter() {
                    if mailbox.key() != &message.sender {
                        mailbox.value().deliver(message.clone());
                        delivered += 1;
                    }
                }
                debug!(
                    message_id = %message.id,
                    sender = %message.sender,
                    delivered,
                    "Broadcast message"
                );
                metrics::counter!("genesis_bus_messages_total", "kind" => "broadcast").increment(1);
            }
        }

        Ok(())
    }

    /// Parse a JSON envelope and route it.
    pub fn send_json(&self, json: &str) -> Result<(), BusError> {
        let message = Message::from_json(json)?;
        self.send(message)
    }

    /// Next message for `agent_id`, waiting up to `timeout` (forever when `None`).
    ///
    /// Returns `Ok(None)` on timeout or when the agent is unregistered while waiting.
    pub async fn receive(&self, agent_id: &str, timeout: Option<Duration>) -> Result<Option<Message>, BusError> {
        let (rx, depth) = self.reader(agent_id)?;

        let next = async {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        let message = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, next).await {
                Ok(message) => message,
                Err(_) => return Ok(None),
            },
            None => next.await,
        };

        if let Some(message) = &message {
            depth.fetch_sub(1, Ordering::SeqCst);
            if !self.owns_mailbox(agent_id, &depth) {
                debug!(agent_id = %agent_id, message_id = %message.id, "Discarding message for unregistered agent");
                return Ok(None);
            }
            debug!(agent_id = %agent_id, message_id = %message.id, "Agent received message");
        }
        Ok(message)
    }

    /// Send `message` and wait for the response correlated to its id.
    ///
    /// Uses the configured request timeout when `timeout` is `None`.
    pub async fn request(&self, message: Message, timeout: Option<Duration>) -> Result<Message, BusError> {
        let timeout = timeout.unwrap_or(self.inner.request_timeout);
        let message_id = message.id;
        let (tx, rx) = oneshot::channel();

        self.inner.pending.insert(message_id, tx);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            message_id,
        };

        self.send(message)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BusError::Cancelled(message_id)),
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(message_id = %message_id, timeout_ms, "Request timed out");
                Err(BusError::Timeout { message_id, timeout })
            }
        }
    }

    /// Consume `agent_id`'s mailbox with its handler until `stop()`,
    /// `shutdown()`, or the agent is unregistered.
    pub async fn start_message_loop(&self, agent_id: &str) -> Result<(), BusError> {
        let handler = self
            .inner
            .handlers
            .get(agent_id)
            .map(|h| h.value().clone())
            .ok_or_else(|| BusError::NoHandler(agent_id.to_string()))?;
        let (rx, depth) = self.reader(agent_id)?;
        let token = self.inner.shutdown.lock().clone();

        info!(agent_id = %agent_id, "Starting message loop");

        let mut rx = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            guard = rx.lock() => guard,
        };

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = rx.recv() => next,
            };
            let Some(message) = next else {
                debug!(agent_id = %agent_id, "Mailbox closed");
                break;
            };
            depth.fetch_sub(1, Ordering::SeqCst);
            if !self.owns_mailbox(agent_id, &depth) {
                debug!(agent_id = %agent_id, message_id = %message.id, "Discarding message for unregistered agent");
                continue;
            }
            self.dispatch(agent_id, handler.as_ref(), message).await;
        }

        info!(agent_id = %agent_id, "Message loop stopped");
        Ok(())
    }

    async fn dispatch(&self, agent_id: &str, handler: &dyn MessageHandler, message: Message) {
        let incoming = message.clone();

        let reply = match handler.handle(message).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(
                    agent_id = %agent_id,
                    message_id = %incoming.id,
                    error = %error,
                    "Message handler failed"
                );
                let mut reply = incoming.create_typed_response(json!({ "error": error }), MessageType::Error);
                reply.sender = agent_id.to_string();
                reply
            }
        };

        if let Err(e) = self.send(reply) {
            warn!(agent_id = %agent_id, error = %e, "Failed to send handler reply");
        }
    }

    /// Stop every running message loop. Loops started afterwards run normally.
    pub fn stop(&self) {
        let token = std::mem::replace(&mut *self.inner.shutdown.lock(), CancellationToken::new());
        token.cancel();
        info!("Message bus loops stopped");
    }

    /// Stop loops, fail outstanding requests with `Cancelled`, and drop every agent.
    pub fn shutdown(&self) {
        self.stop();
        self.inner.pending.clear();
        self.inner.handlers.clear();
        self.inner.mailboxes.clear();
        self.inner.agents.clear();
        info!("Message bus shut down");
    }

    /// Registered agents, optionally filtered by capability, ordered by id.
    pub fn discover_agents(&self, capability: Option<&str>) -> Vec<AgentCard> {
        let mut cards: Vec<AgentCard> = self
            .inner
            .agents
            .iter()
            .filter(|card| capability.map_or(true, |c| card.matches_capability(c)))
            .map(|card| card.value().clone())
            .collect();
        cards.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        cards
    }

    pub fn get_agent_card(&self, agent_id: &str) -> Option<AgentCard> {
        self.inner.agents.get(agent_id).map(|card| card.value().clone())
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            registered_agents: self.inner.agents.len(),
            pending_requests: self.inner.pending.len(),
            queue_depths: self
                .inner
                .mailboxes
                .iter()
                .map(|m| (m.key().clone(), m.value().depth.load(Ordering::SeqCst)))
                .collect(),
        }
    }

    /// Whether `depth` still belongs to the mailbox registered for `agent_id`.
    /// False once the agent is unregistered, even if it registered again.
    fn owns_mailbox(&self, agent_id: &str, depth: &Arc<AtomicUsize>) -> bool {
        self.inner
            .mailboxes
            .get(agent_id)
            .is_some_and(|m| Arc::ptr_eq(&m.depth, depth))
    }

    fn reader(&self, agent_id: &str) -> Result<(SharedReceiver, Arc<AtomicUsize>), BusError> {
        self.inner
            .mailboxes
            .get(agent_id)
            .map(|m| (m.rx.clone(), m.depth.clone()))
            .ok_or_else(|| BusError::AgentNotRegistered(agent_id.to_string()))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(MessageBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn bus_with(agents: &[&str]) -> MessageBus {
        let bus = MessageBus::default();
        for id in agents {
            bus.register_agent(AgentCard::new(*id, id.to_uppercase()));
        }
        bus
    }

    #[tokio::test]
    async fn test_direct_delivery_is_fifo() {
        let bus = bus_with(&["a", "b"]);
        for i in 0..3 {
            bus.send(Message::direct(MessageType::TaskRequest, "a", "b", json!(i))).unwrap();
        }

        assert_eq!(bus.stats().queue_depths["b"], 3);
        for i in 0..3 {
            let message = bus.receive("b", Some(Duration::from_millis(50))).await.unwrap().unwrap();
            assert_eq!(message.payload, json!(i));
        }
        assert_eq!(bus.stats().queue_depths["b"], 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_agent_fails() {
        let bus = bus_with(&["a"]);
        let result = bus.send(Message::direct(MessageType::Ping, "a", "ghost", Value::Null));
        assert!(matches!(result, Err(BusError::AgentNotRegistered(id)) if id == "ghost"));
        assert!(matches!(bus.receive("ghost", None).await, Err(BusError::AgentNotRegistered(_))));
    }

    #[tokio::test]
    async fn test_receive_times_out_with_none() {
        let bus = bus_with(&["a"]);
        assert!(bus.receive("a", Some(Duration::from_millis(10))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncorrelated_response_is_dropped() {
        let bus = bus_with(&["a", "b"]);
        let request = Message::direct(MessageType::TaskRequest, "a", "b", json!({}));
        bus.send(request.create_response(json!("late"))).unwrap();

        assert!(bus.receive("a", Some(Duration::from_millis(10))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reregistration_keeps_mailbox() {
        let bus = bus_with(&["a", "b"]);
        bus.send(Message::direct(MessageType::Ping, "a", "b", Value::Null)).unwrap();
        bus.register_agent(AgentCard::new("b", "B2").with_capabilities(["write"]));

        assert_eq!(bus.get_agent_card("b").unwrap().name, "B2");
        assert!(bus.receive("b", Some(Duration::from_millis(10))).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_handler_requires_registration() {
        let bus = bus_with(&[]);
        let result = bus.set_handler("nobody", |_m: Message| async { Ok::<Option<Message>, anyhow::Error>(None) });
        assert!(matches!(result, Err(BusError::AgentNotRegistered(_))));
    }

    #[tokio::test]
    async fn test_send_json_rejects_malformed_envelope() {
        let bus = bus_with(&["a"]);
        assert!(matches!(bus.send_json("{not json"), Err(BusError::Serialization(_))));
        bus.send_json(r#"{"type": "ping", "sender": "x", "receiver": "a"}"#).unwrap();
        let message = bus.receive("a", Some(Duration::from_millis(10))).await.unwrap().unwrap();
        assert_eq!(message.message_type, MessageType::Ping);
    }
}
