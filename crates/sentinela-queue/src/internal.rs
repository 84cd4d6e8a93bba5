use crate::{Envelope, Message, MessageKind, QueueError, WorkQueue};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

struct Entry {
    envelope: Envelope,
    /// Monotonic enqueue order, used to keep redeliveries roughly FIFO.
    sequence: u64,
}

struct State {
    ready: VecDeque<Entry>,
    in_flight: HashMap<String, (Entry, Instant)>,
    next_sequence: u64,
}

impl State {
    /// Move expired in-flight entries back to the ready queue.
    fn reap(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some((entry, _)) = self.in_flight.remove(&receipt) {
                tracing::debug!(sequence = entry.sequence, "Message visibility expired, requeueing");
                self.requeue(entry);
            }
        }
    }

    fn requeue(&mut self, entry: Entry) {
        let position = self
            .ready
            .iter()
            .position(|queued| queued.sequence > entry.sequence)
            .unwrap_or(self.ready.len());
        self.ready.insert(position, entry);
    }

    fn total(&self) -> usize {
        self.ready.len() + self.in_flight.len()
    }
}

/// Bounded in-process FIFO with per-delivery visibility leases, for
/// single-container deployments.
pub struct InternalQueue {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
    visibility: Duration,
}

impl InternalQueue {
    pub fn new(capacity: usize, visibility: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
                next_sequence: 0,
            }),
            notify: Notify::new(),
            capacity,
            visibility,
        }
    }

    /// Messages currently queued or in flight.
    pub async fn len(&self) -> usize {
        self.state.lock().await.total()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WorkQueue for InternalQueue {
    async fn send(&self, kind: MessageKind, payload: serde_json::Value) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.reap(Instant::now());

        if state.total() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.ready.push_back(Entry {
            envelope: Envelope { kind, payload },
            sequence,
        });
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Message>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            {
                let mut state = self.state.lock().await;
                state.reap(Instant::now());

                if let Some(entry) = state.ready.pop_front() {
                    let receipt = Uuid::new_v4().to_string();
                    let message = Message {
                        kind: entry.envelope.kind,
                        payload: entry.envelope.payload.clone(),
                        receipt: receipt.clone(),
                    };
                    state
                        .in_flight
                        .insert(receipt, (entry, Instant::now() + self.visibility));
                    return Ok(Some(message));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // A wake-up can race with another receiver taking the
            // message, so loop and re-check.
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    async fn extend_visibility(
        &self,
        message: &Message,
        window: Duration,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some((_, deadline)) = state.in_flight.get_mut(&message.receipt) {
            *deadline = Instant::now() + window;
        }
        Ok(())
    }

    async fn ack(&self, message: &Message) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&message.receipt);
        Ok(())
    }

    async fn nack(&self, message: &Message) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some((entry, _)) = state.in_flight.remove(&message.receipt) {
            state.requeue(entry);
            drop(state);
            self.notify.notify_one();
        }
        Ok(())
    }
}
