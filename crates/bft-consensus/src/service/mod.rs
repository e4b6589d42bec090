//! Consensus Service
//!
//! # Architecture
//! - One tokio task owns the [`Core`] and consumes [`ConsensusEvent`]s
//!   from a bounded queue in order
//! - Ingress verification runs in the submitting task, before queueing
//! - Timers, redelivery of future-timestamp proposals and the backlog
//!   feed the same queue
//! - Observers read [`CoreSnapshot`]s from a watch channel

mod backlog;
mod ingress;


pub use backlog::Backlog;
pub use ingress::{verify, IngressError, View};

use crate::adapters::TokioTimeoutScheduler;
use crate::config::ConsensusConfig;
use crate::domain::{Behaviour, ConsensusMessage, CoreError, SignedMessage};
use crate::engine::{Core, CoreDependencies, CoreSnapshot, DeferReason, Disposition};
use crate::events::ConsensusEvent;
use crate::metrics;
use crate::ports::{Backend, Broadcaster, CommitteeProvider, ConsensusApi, ConsensusWal};
use async_trait::async_trait;
use bft_types::{short_hex, Block, Height, Round};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Consensus event channel closed")]
    ChannelClosed,
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
    #[error("Ingress rejected message: {0}")]
    Ingress(#[from] IngressError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Dependencies for ConsensusService
pub struct ServiceDependencies {
    pub backend: Arc<dyn Backend>,
    pub committee_provider: Arc<dyn CommitteeProvider>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub behaviour: Arc<dyn Behaviour>,
    pub wal: Option<Arc<dyn ConsensusWal>>,
}

pub struct ConsensusService {
    core: Core,
    backlog: Backlog,
    events_tx: mpsc::Sender<ConsensusEvent>,
    events_rx: mpsc::Receiver<ConsensusEvent>,
    snapshot_tx: watch::Sender<CoreSnapshot>,
    view_tx: watch::Sender<View>,
}

impl ConsensusService {
    /// Wire a core to a fresh event queue. Nothing runs until
    /// [`ConsensusService::run`] is awaited.
    pub fn new(
        config: ConsensusConfig,
        deps: ServiceDependencies,
    ) -> ServiceResult<(Self, ConsensusHandle)> {
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity());
        let scheduler = Arc::new(TokioTimeoutScheduler::new(events_tx.clone()));
        let backlog = Backlog::new(
            deps.backend.address(),
            config.backlog_height_window,
            config.backlog_per_sender,
            config.backlog_outsider_cap,
        );
        let core = Core::new(
            config,
            CoreDependencies {
                backend: deps.backend,
                committee_provider: deps.committee_provider,
                broadcaster: deps.broadcaster,
                scheduler,
                behaviour: deps.behaviour,
                wal: deps.wal,
            },
        )?;

        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let (view_tx, view_rx) = watch::channel(view_of(&core));
        let handle = ConsensusHandle {
            events: events_tx.clone(),
            view: view_rx,
            snapshots: snapshot_rx,
        };
        Ok((
            Self {
                core,
                backlog,
                events_tx,
                events_rx,
                snapshot_tx,
                view_tx,
            },
            handle,
        ))
    }

    /// Start the core and process events until shutdown or until every
    /// handle is dropped.
    pub async fn run(mut self) -> ServiceResult<()> {
        self.core.start()?;
        self.publish();
        info!(
            address = %short_hex(&self.core.address()),
            height = self.core.height(),
            "Consensus service started"
        );

        while let Some(event) = self.events_rx.recv().await {
            if matches!(event, ConsensusEvent::Shutdown) {
                break;
            }
            self.handle_event(event);
            self.publish();
        }
        info!(height = self.core.height(), "Consensus service stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: ConsensusEvent) {
        let view = (self.core.height(), self.core.round());
        debug!(event = event.name(), height = view.0, round = view.1, "Handling event");
        match event {
            ConsensusEvent::Message(message) | ConsensusEvent::Redeliver(message) => {
                self.deliver(message)
            }
            ConsensusEvent::Timeout(token) => {
                if let Err(e) = self.core.handle_timeout(token) {
                    warn!(%token, error = %e, "Timeout handling failed");
                }
            }
            ConsensusEvent::CandidateBlock(block) => {
                if let Err(e) = self.core.new_candidate_block(block) {
                    warn!(error = %e, "Candidate block handling failed");
                }
            }
            ConsensusEvent::BlockFinalized(block) => {
                if let Err(e) = self.core.on_block_finalized(&block) {
                    error!(height = block.height(), error = %e, "Failed to start next height");
                }
                self.backlog.clear_below(self.core.height());
            }
            ConsensusEvent::Shutdown => {}
        }
        self.replay_backlog(view);
    }

    fn deliver(&mut self, message: ConsensusMessage) {
        if message.height() == self.core.height()
            && self
                .core
                .committee()
                .member_by_address(&message.sender())
                .is_none()
        {
            warn!(?message, "Dropping message from non-member");
            return;
        }
        match self.core.handle_message(message.clone()) {
            Ok(Disposition::Defer(reason)) => {
                let is_member = self
                    .core
                    .committee()
                    .member_by_address(&message.sender())
                    .is_some();
                if self.backlog.push(message, self.core.height(), is_member) {
                    debug!(?reason, "Message backlogged");
                }
            }
            Ok(_) => {}
            Err(CoreError::FutureBlock { retry_after }) => {
                debug!(?message, ?retry_after, "Proposal from the future, redelivering later");
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(retry_after).await;
                    let _ = events.send(ConsensusEvent::Redeliver(message)).await;
                });
            }
            Err(e) => warn!(?message, error = %e, "Message rejected by core"),
        }
    }

    /// Feed buffered messages back in for as long as the view keeps moving.
    fn replay_backlog(&mut self, mut before: (Height, Round)) {
        loop {
            let now = (self.core.height(), self.core.round());
            if now == before {
                break;
            }
            before = now;
            let ready = self.backlog.take_ready(now.0, now.1);
            if !ready.is_empty() {
                debug!(count = ready.len(), height = now.0, round = now.1, "Replaying backlog");
            }
            for message in ready {
                if message.height() == self.core.height() {
                    self.deliver(message);
                }
            }
        }
    }

    fn publish(&mut self) {
        let mut snapshot = self.core.snapshot();
        snapshot.backlog_len = self.backlog.len();
        metrics::set_backlog_size(snapshot.backlog_len);
        self.snapshot_tx.send_replace(snapshot);

        let current = self.view_tx.borrow().height;
        let round = self.view_tx.borrow().round;
        if current != self.core.height() || round != self.core.round() {
            self.view_tx.send_replace(view_of(&self.core));
        }
    }
}

fn view_of(core: &Core) -> View {
    View {
        height: core.height(),
        round: core.round(),
        committee: core.committee(),
        max_round: core.config().max_round,
    }
}

/// Cloneable entry point to a running [`ConsensusService`].
#[derive(Clone)]
pub struct ConsensusHandle {
    events: mpsc::Sender<ConsensusEvent>,
    view: watch::Receiver<View>,
    snapshots: watch::Receiver<CoreSnapshot>,
}

impl ConsensusHandle {
    async fn send(&self, event: ConsensusEvent) -> ServiceResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ServiceError::ChannelClosed)
    }

    /// Ask the event loop to stop after the events already queued.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.send(ConsensusEvent::Shutdown).await
    }

    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    /// Receiver notified on every processed event.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<CoreSnapshot> {
        self.snapshots.clone()
    }
}

#[async_trait]
impl ConsensusApi for ConsensusHandle {
    async fn submit_message(&self, message: SignedMessage) -> ServiceResult<()> {
        let view = self.view();
        let verified = verify(message, &view)?;
        self.send(ConsensusEvent::Message(verified)).await
    }

    async fn submit_candidate_block(&self, block: Block) -> ServiceResult<()> {
        self.send(ConsensusEvent::CandidateBlock(block)).await
    }

    async fn notify_block_finalized(&self, block: Block) -> ServiceResult<()> {
        self.send(ConsensusEvent::BlockFinalized(block)).await
    }

    async fn snapshot(&self) -> CoreSnapshot {
        self.snapshots.borrow().clone()
    }
}
