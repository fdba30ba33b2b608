//! Async match runner and registry
//!
//! One tokio task per match drives a `MatchEngine` at the fixed tick rate.
//! Inputs arrive over an mpsc channel and are buffered by the engine for the
//! tick they are tagged with; one broadcast message leaves per executed tick.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::tick_duration;
use crate::ws::protocol::ServerMsg;

use super::engine::{MatchEngine, MatchExport};
use super::input::{HmacAuthenticator, InputLog, PlayerInput};
use super::snapshot::{MatchSnapshot, SnapshotBuilder};
use super::validator::RejectionStats;
use super::world::{MatchSetup, SetupError};

const INPUT_CHANNEL_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 128;

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    status_rx: watch::Receiver<MatchSnapshot>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl MatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    /// Latest published view of the match
    pub fn status(&self) -> MatchSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Next tick the match will execute
    pub fn tick(&self) -> u64 {
        self.status_rx.borrow().tick
    }

    /// End this match after the tick in progress. Other matches are unaffected.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }
}

/// Everything kept about a match once its task has exited
#[derive(Debug, Clone)]
pub struct FinishedMatch {
    pub export: MatchExport,
    pub setup: MatchSetup,
    pub log: InputLog,
    pub rejections: RejectionStats,
}

/// Registry of running and finished matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    finished: DashMap<Uuid, Arc<FinishedMatch>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            finished: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn finished_matches(&self) -> usize {
        self.finished.len()
    }

    /// Move a match from the running set to the finished set
    pub fn finish(&self, record: FinishedMatch) {
        let id = record.export.match_id;
        // Publish the record before dropping the handle so lookups never miss
        self.finished.insert(id, Arc::new(record));
        self.remove(&id);
    }

    pub fn finished(&self, id: &Uuid) -> Option<Arc<FinishedMatch>> {
        self.finished.get(id).map(|m| Arc::clone(m.value()))
    }

    /// Register and run a match on its own task
    pub fn spawn(self: &Arc<Self>, game_match: GameMatch, handle: MatchHandle) -> JoinHandle<()> {
        self.insert(handle);
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let record = game_match.run().await;
            registry.finish(record);
        })
    }

    /// Cancel every running match
    pub fn cancel_all(&self) {
        for entry in self.matches.iter() {
            entry.value().cancel();
        }
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative match task
pub struct GameMatch {
    engine: MatchEngine<HmacAuthenticator>,
    input_rx: mpsc::Receiver<PlayerInput>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    status_tx: watch::Sender<MatchSnapshot>,
    cancel_rx: watch::Receiver<bool>,
    snapshot_builder: SnapshotBuilder,
    tick_duration: Duration,
}

impl GameMatch {
    /// Create a new match
    pub fn new(
        setup: MatchSetup,
        authenticator: HmacAuthenticator,
    ) -> Result<(Self, MatchHandle), SetupError> {
        let engine = MatchEngine::new(setup, authenticator)?;
        let id = engine.match_id();

        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (status_tx, status_rx) = watch::channel(MatchSnapshot::from_state(engine.state()));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = MatchHandle {
            id,
            input_tx,
            broadcast_tx: broadcast_tx.clone(),
            status_rx,
            cancel_tx: Arc::new(cancel_tx),
        };

        let game_match = Self {
            engine,
            input_rx,
            broadcast_tx,
            status_tx,
            cancel_rx,
            snapshot_builder: SnapshotBuilder::new(),
            tick_duration: tick_duration(),
        };

        Ok((game_match, handle))
    }

    /// Override the wall-clock tick interval
    pub fn with_tick_duration(mut self, tick_duration: Duration) -> Self {
        self.tick_duration = tick_duration;
        self
    }

    /// Run the authoritative tick loop until the match ends or is cancelled
    pub async fn run(mut self) -> FinishedMatch {
        let match_id = self.engine.match_id();
        info!(
            match_id = %match_id,
            duration_ticks = self.engine.setup().config.duration_ticks,
            "Match started"
        );

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                // A dropped sender means nobody can observe the match any more
                _ = self.cancel_rx.changed() => {
                    self.engine.terminate();
                    break;
                }
                _ = tick_interval.tick() => {}
            }

            self.process_inputs();

            let Some(report) = self.engine.step() else {
                break;
            };

            let msg = self.snapshot_builder.build(&report);
            if let Err(broadcast::error::SendError(ServerMsg::Tick { events, .. })) =
                self.broadcast_tx.send(msg)
            {
                // Nobody subscribed; hold the events for the next broadcast
                self.snapshot_builder.carry(events);
            }
            self.status_tx
                .send_replace(MatchSnapshot::from_state(self.engine.state()));

            if report.outcome.is_some() {
                break;
            }
        }

        self.status_tx
            .send_replace(MatchSnapshot::from_state(self.engine.state()));
        let export = self.engine.export();
        info!(
            match_id = %match_id,
            final_tick = export.final_tick,
            home = export.final_score.home,
            away = export.final_score.away,
            outcome = ?export.outcome,
            rejected_inputs = self.engine.rejections().total(),
            "Match ended"
        );
        let _ = self.broadcast_tx.send(ServerMsg::MatchEnd {
            export: export.clone(),
        });

        FinishedMatch {
            export,
            setup: self.engine.setup().clone(),
            log: self.engine.log().clone(),
            rejections: self.engine.rejections().clone(),
        }
    }

    /// Hand every queued input to the engine's per-tick buffer
    fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            if let Err(reason) = self.engine.submit(input) {
                debug!(match_id = %self.engine.match_id(), ?reason, "Dropped input at ingestion");
            }
        }
    }
}
