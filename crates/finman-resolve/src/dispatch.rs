//! Per-conversation serialization of turns.
//!
//! Each conversation gets a lane: an unbounded queue drained by its own task.
//! Turns for one conversation run one at a time in arrival order; different
//! conversations run concurrently. A lane that sits idle retires itself, and
//! a lane started after [`Dispatcher::close`] waits for the closed lane to
//! drain before taking its first job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::machine::{Inbound, Resolver, TurnOutcome};
use crate::reply::Reply;
use crate::session::ConversationId;

/// How long a lane waits for a job before retiring.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

struct Job {
    inbound: Inbound,
    done: oneshot::Sender<TurnOutcome>,
}

struct Lane {
    id: u64,
    jobs: mpsc::UnboundedSender<Job>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Lanes {
    next_id: u64,
    open: HashMap<ConversationId, Lane>,
    /// Closed lanes still working through their queue, keyed by conversation.
    draining: HashMap<ConversationId, (u64, JoinHandle<()>)>,
}

pub struct Dispatcher {
    resolver: Arc<Resolver>,
    lanes: Arc<Mutex<Lanes>>,
    idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            lanes: Arc::new(Mutex::new(Lanes::default())),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Queue a turn and return a handle to its outcome.
    ///
    /// Queue position is fixed when this returns, so calls made in receipt
    /// order are handled in receipt order. Must be called inside a Tokio
    /// runtime.
    pub fn submit(&self, conv: ConversationId, inbound: Inbound) -> oneshot::Receiver<TurnOutcome> {
        let (done, outcome) = oneshot::channel();
        let mut job = Job { inbound, done };
        let mut lanes = lock(&self.lanes);
        if let Some(lane) = lanes.open.get(&conv) {
            match lane.jobs.send(job) {
                Ok(()) => return outcome,
                // The lane's task is gone; start a new one below.
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }
        let lane = self.spawn_lane(&mut lanes, conv.clone());
        if lane.jobs.send(job).is_err() {
            debug!(conversation = %conv, "new lane closed before first job");
        }
        lanes.open.insert(conv, lane);
        outcome
    }

    /// Queue a turn and wait for it.
    pub async fn dispatch(&self, conv: ConversationId, inbound: Inbound) -> TurnOutcome {
        self.submit(conv, inbound)
            .await
            .unwrap_or_else(|_| TurnOutcome::idle(Reply::Internal))
    }

    /// Stop taking turns on the lane for `conv`. Turns already queued still
    /// run, and a later turn for `conv` starts only after they finish.
    pub fn close(&self, conv: &ConversationId) {
        let mut lanes = lock(&self.lanes);
        if let Some(lane) = lanes.open.remove(conv) {
            lanes.draining.insert(conv.clone(), (lane.id, lane.task));
        }
    }

    /// Number of conversations with an open lane.
    pub fn active(&self) -> usize {
        lock(&self.lanes).open.len()
    }

    fn spawn_lane(&self, lanes: &mut Lanes, conv: ConversationId) -> Lane {
        let id = lanes.next_id;
        lanes.next_id += 1;
        let predecessor = lanes.draining.remove(&conv).map(|(_, task)| task);
        let (jobs, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_lane(
            self.resolver.clone(),
            self.lanes.clone(),
            conv,
            id,
            rx,
            predecessor,
            self.idle_timeout,
        ));
        Lane { id, jobs, task }
    }
}

// The map holds only senders and handles, so a poisoned guard is still consistent.
fn lock(lanes: &Mutex<Lanes>) -> MutexGuard<'_, Lanes> {
    lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_lane(
    resolver: Arc<Resolver>,
    lanes: Arc<Mutex<Lanes>>,
    conv: ConversationId,
    id: u64,
    mut rx: mpsc::UnboundedReceiver<Job>,
    predecessor: Option<JoinHandle<()>>,
    idle_timeout: Duration,
) {
    if let Some(previous) = predecessor {
        debug!(conversation = %conv, lane = id, "waiting for closed lane to drain");
        let _ = previous.await;
    }
    debug!(conversation = %conv, lane = id, "lane started");
    loop {
        let job = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                forget_drained(&lanes, &conv, id);
                break;
            }
            Err(_) => match take_or_retire(&lanes, &conv, id, &mut rx) {
                Some(job) => job,
                None => break,
            },
        };
        let outcome = resolver.handle(&conv, job.inbound).await;
        if job.done.send(outcome).is_err() {
            debug!(conversation = %conv, "caller went away before turn finished");
        }
    }
    debug!(conversation = %conv, lane = id, "lane closed");
}

/// After an idle timeout: take a job that raced in, or remove this lane.
///
/// Senders only push while holding the map lock, so an empty queue seen
/// under the lock stays empty once the lane is unregistered.
fn take_or_retire(
    lanes: &Mutex<Lanes>,
    conv: &ConversationId,
    id: u64,
    rx: &mut mpsc::UnboundedReceiver<Job>,
) -> Option<Job> {
    let mut lanes = lock(lanes);
    if let Ok(job) = rx.try_recv() {
        return Some(job);
    }
    if lanes.open.get(conv).is_some_and(|lane| lane.id == id) {
        lanes.open.remove(conv);
        debug!(conversation = %conv, lane = id, "idle lane retired");
    }
    None
}

fn forget_drained(lanes: &Mutex<Lanes>, conv: &ConversationId, id: u64) {
    let mut lanes = lock(lanes);
    if lanes.draining.get(conv).is_some_and(|(drained, _)| *drained == id) {
        lanes.draining.remove(conv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::ResolverConfig;
    use crate::testing::{ScriptedExtractor, conv, harness, me};
    use async_trait::async_trait;
    use finman_ai::{ExtractError, Extractor, ImageRef, RawExtraction};
    use serde_json::json;
    use tokio::sync::Notify;
    use tokio::sync::oneshot::error::TryRecvError;

    fn lunch() -> serde_json::Value {
        json!({"Name": "Lunch", "category": "Food", "price": 120,
               "confidence": {"name": 0.95, "category": 0.9, "price": 0.95}})
    }

    /// Holds calls for "slow" until released and records finish order.
    struct Gated {
        gate: Notify,
        finished: std::sync::Mutex<Vec<String>>,
    }

    impl Gated {
        fn new() -> Self {
            Self {
                gate: Notify::new(),
                finished: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn finished(&self) -> Vec<String> {
            self.finished.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Extractor for Gated {
        async fn extract(
            &self,
            text: &str,
            _image: Option<&ImageRef>,
            _force_guess: bool,
        ) -> Result<RawExtraction, ExtractError> {
            if text == "slow" {
                self.gate.notified().await;
            }
            self.finished.lock().unwrap().push(text.to_string());
            match lunch() {
                serde_json::Value::Object(map) => Ok(map),
                _ => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn turns_in_one_conversation_run_in_order() {
        let extractor = ScriptedExtractor::new()
            .answer(
                "mystery item",
                json!({"Name": "mystery item", "price": null,
                       "confidence": {"name": 0.9, "category": 0.3, "price": 0.0}}),
            )
            .answer(
                "mystery item 50 rupees food",
                json!({"Name": "mystery item", "category": "Food", "price": 50,
                       "confidence": {"name": 0.9, "category": 0.9, "price": 0.9}}),
            );
        let h = harness(Arc::new(extractor), ResolverConfig::default());
        let dispatcher = Dispatcher::new(h.resolver.clone());

        let first = dispatcher.submit(conv(), Inbound::text("mystery item"));
        let second = dispatcher.submit(conv(), Inbound::text("50 rupees food"));
        let outcomes = futures::future::join_all([first, second]).await;

        let first = outcomes[0].as_ref().unwrap();
        let second = outcomes[1].as_ref().unwrap();
        assert!(matches!(first.reply, Reply::Ask { .. }));
        assert!(second.saved.is_some());
        assert_eq!(h.store.inner().len(), 1);
        assert_eq!(dispatcher.active(), 1);
    }

    #[tokio::test]
    async fn conversations_do_not_block_each_other() {
        let extractor = Arc::new(Gated::new());
        let h = harness(extractor.clone(), ResolverConfig::default());
        let other = ConversationId::from("chat-2");
        h.sessions.bind_identity(&other, me()).unwrap();
        let dispatcher = Dispatcher::new(h.resolver.clone());

        let mut slow = dispatcher.submit(conv(), Inbound::text("slow"));
        let fast = dispatcher.dispatch(other, Inbound::text("fast")).await;
        assert!(fast.saved.is_some());
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Empty)));

        extractor.gate.notify_one();
        let slow = slow.await.unwrap();
        assert!(slow.saved.is_some());
        assert_eq!(h.store.inner().len(), 2);
    }

    #[tokio::test]
    async fn closed_lane_is_restarted_on_demand() {
        let extractor = ScriptedExtractor::new().answer("Lunch 120 Food", lunch());
        let h = harness(Arc::new(extractor), ResolverConfig::default());
        let dispatcher = Dispatcher::new(h.resolver.clone());

        dispatcher.dispatch(conv(), Inbound::text("Lunch 120 Food")).await;
        dispatcher.close(&conv());
        assert_eq!(dispatcher.active(), 0);

        let out = dispatcher.dispatch(conv(), Inbound::text("Lunch 120 Food")).await;
        assert!(out.saved.is_some());
        assert_eq!(h.store.inner().len(), 2);
    }

    #[tokio::test]
    async fn reopened_lane_waits_for_closed_one() {
        let extractor = Arc::new(Gated::new());
        let h = harness(extractor.clone(), ResolverConfig::default());
        let dispatcher = Dispatcher::new(h.resolver.clone());

        let slow = dispatcher.submit(conv(), Inbound::text("slow"));
        dispatcher.close(&conv());
        let mut fast = dispatcher.submit(conv(), Inbound::text("fast"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(fast.try_recv(), Err(TryRecvError::Empty)));
        assert!(extractor.finished().is_empty());

        extractor.gate.notify_one();
        assert!(slow.await.unwrap().saved.is_some());
        assert!(fast.await.unwrap().saved.is_some());
        assert_eq!(extractor.finished(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn idle_lanes_retire_themselves() {
        let extractor = ScriptedExtractor::new().answer("Lunch 120 Food", lunch());
        let h = harness(Arc::new(extractor), ResolverConfig::default());
        let dispatcher =
            Dispatcher::new(h.resolver.clone()).with_idle_timeout(Duration::from_millis(30));

        dispatcher.dispatch(conv(), Inbound::text("Lunch 120 Food")).await;
        assert_eq!(dispatcher.active(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(dispatcher.active(), 0);

        let out = dispatcher.dispatch(conv(), Inbound::text("Lunch 120 Food")).await;
        assert!(out.saved.is_some());
        assert_eq!(h.store.inner().len(), 2);
    }
}
