use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Notify, RwLock};

use crate::channel::DownstreamChannel;
use crate::error::{ExchangeError, ExchangeResult};
use crate::test_utils::notify::TimedNotify;
use crate::types::{OperationMessage, PushAck, SequenceIndex, TargetId};

/// Message observed by a [`ScriptedChannel`], in arrival order.
#[derive(Debug, Clone)]
pub struct ReceivedMessage<R> {
    pub target_id: TargetId,
    pub sequence_index: SequenceIndex,
    pub rows: Vec<R>,
    pub is_last: bool,
    pub failure: Option<ExchangeError>,
}

impl<R> ReceivedMessage<R> {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// How a [`ScriptedChannel`] settles one push.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Ack(PushAck),
    Fail(ExchangeError),
    /// Panics inside the push future.
    Panic,
}

type MessagesCondition<R> = Box<dyn Fn(&[ReceivedMessage<R>]) -> bool + Send + Sync>;

struct Inner<R> {
    messages: Vec<ReceivedMessage<R>>,
    responses: HashMap<(TargetId, usize), ScriptedResponse>,
    holds: HashMap<(TargetId, usize), Arc<Notify>>,
    pushes: HashMap<TargetId, usize>,
    in_flight: HashMap<TargetId, SequenceIndex>,
    overlapping_pushes: usize,
    concurrent_target_pushes: usize,
    rng: Option<StdRng>,
    max_delay: Duration,
    conditions: Vec<(MessagesCondition<R>, Arc<Notify>)>,
}

impl<R> Inner<R> {
    fn check_conditions(&mut self) {
        let messages = &self.messages;
        self.conditions.retain(|(condition, notify)| {
            let should_retain = !condition(messages);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }

    fn next_delay(&mut self) -> Option<Duration> {
        let max_micros = self.max_delay.as_micros() as u64;
        let rng = self.rng.as_mut()?;

        Some(Duration::from_micros(rng.gen_range(0..=max_micros)))
    }
}

/// Downstream channel recording every push and settling each one as scripted.
///
/// Pushes are numbered per target starting at 1. Unscripted pushes acknowledge with
/// [`PushAck::MORE`]. The channel also checks the coordinator's concurrency guarantees: pushes of
/// different cycles must never be in flight at the same time, and a target never has two pushes
/// in flight.
#[derive(Clone)]
pub struct ScriptedChannel<R> {
    inner: Arc<RwLock<Inner<R>>>,
}

impl<R> ScriptedChannel<R> {
    pub fn new() -> Self {
        Self::with_rng(None, Duration::ZERO)
    }

    /// Creates a channel delaying every push by a random duration up to `max_delay`.
    ///
    /// The delays derive from `seed`, so a failing interleaving can be replayed.
    pub fn with_random_delays(seed: u64, max_delay: Duration) -> Self {
        Self::with_rng(Some(StdRng::seed_from_u64(seed)), max_delay)
    }

    fn with_rng(rng: Option<StdRng>, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                messages: Vec::new(),
                responses: HashMap::new(),
                holds: HashMap::new(),
                pushes: HashMap::new(),
                in_flight: HashMap::new(),
                overlapping_pushes: 0,
                concurrent_target_pushes: 0,
                rng,
                max_delay,
                conditions: Vec::new(),
            })),
        }
    }

    /// Scripts how the `push_number`-th push to `target_id` is settled.
    pub async fn respond(&self, target_id: TargetId, push_number: usize, response: ScriptedResponse) {
        let mut inner = self.inner.write().await;
        inner.responses.insert((target_id, push_number), response);
    }

    /// Holds the `push_number`-th push to `target_id` until the returned notify fires.
    ///
    /// The held push is recorded when it arrives, before it is released.
    pub async fn hold(&self, target_id: TargetId, push_number: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner.holds.insert((target_id, push_number), notify.clone());

        TimedNotify::new(notify)
    }

    /// Registers a notification firing once the received messages satisfy `condition`.
    pub async fn notify_on_messages<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&[ReceivedMessage<R>]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner.conditions.push((Box::new(condition), notify.clone()));

        // The condition may already hold.
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    /// Registers a notification firing once `count` messages were received in total.
    pub async fn wait_for_messages(&self, count: usize) -> TimedNotify {
        self.notify_on_messages(move |messages| messages.len() >= count)
            .await
    }

    /// Returns the number of pushes `target_id` received.
    pub async fn push_count(&self, target_id: TargetId) -> usize {
        let inner = self.inner.read().await;
        inner.pushes.get(&target_id).copied().unwrap_or(0)
    }

    /// Returns how many pushes started while a push of another cycle was in flight.
    pub async fn overlapping_pushes(&self) -> usize {
        self.inner.read().await.overlapping_pushes
    }

    /// Returns how many pushes started while the same target had a push in flight.
    pub async fn concurrent_target_pushes(&self) -> usize {
        self.inner.read().await.concurrent_target_pushes
    }

    /// Returns every failure notice received, in arrival order.
    pub async fn failure_notices(&self) -> Vec<(TargetId, ExchangeError)> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .filter_map(|message| {
                message
                    .failure
                    .clone()
                    .map(|failure| (message.target_id, failure))
            })
            .collect()
    }
}

impl<R: Clone> ScriptedChannel<R> {
    /// Returns every message received, in arrival order.
    pub async fn messages(&self) -> Vec<ReceivedMessage<R>> {
        self.inner.read().await.messages.clone()
    }

    /// Returns the messages received by `target_id`, in arrival order.
    pub async fn messages_for(&self, target_id: TargetId) -> Vec<ReceivedMessage<R>> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .filter(|message| message.target_id == target_id)
            .cloned()
            .collect()
    }

    /// Returns the rows delivered to `target_id`, in delivery order.
    pub async fn rows_for(&self, target_id: TargetId) -> Vec<R> {
        self.messages_for(target_id)
            .await
            .into_iter()
            .flat_map(|message| message.rows)
            .collect()
    }
}

impl<R> Default for ScriptedChannel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ScriptedChannel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedChannel").finish_non_exhaustive()
    }
}

impl<R> DownstreamChannel<R> for ScriptedChannel<R>
where
    R: Send + Sync + 'static,
{
    async fn push(
        &self,
        target_id: TargetId,
        message: OperationMessage<R>,
    ) -> ExchangeResult<PushAck> {
        let sequence_index = message.sequence_index;

        let (response, hold, delay) = {
            let mut inner = self.inner.write().await;

            let push_number = {
                let pushes = inner.pushes.entry(target_id).or_default();
                *pushes += 1;
                *pushes
            };

            if inner.in_flight.contains_key(&target_id) {
                inner.concurrent_target_pushes += 1;
            }
            if inner
                .in_flight
                .values()
                .any(|in_flight| *in_flight != sequence_index)
            {
                inner.overlapping_pushes += 1;
            }
            inner.in_flight.insert(target_id, sequence_index);

            inner.messages.push(ReceivedMessage {
                target_id,
                sequence_index,
                rows: message
                    .bucket
                    .map(|bucket| bucket.into_rows())
                    .unwrap_or_default(),
                is_last: message.is_last,
                failure: message.failure,
            });
            inner.check_conditions();

            let response = inner
                .responses
                .remove(&(target_id, push_number))
                .unwrap_or(ScriptedResponse::Ack(PushAck::MORE));
            let hold = inner.holds.remove(&(target_id, push_number));
            let delay = inner.next_delay();

            (response, hold, delay)
        };

        if let Some(hold) = hold {
            hold.notified().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.inner.write().await.in_flight.remove(&target_id);

        match response {
            ScriptedResponse::Ack(ack) => Ok(ack),
            ScriptedResponse::Fail(err) => Err(err),
            ScriptedResponse::Panic => panic!("scripted panic while pushing to target {target_id}"),
        }
    }
}
