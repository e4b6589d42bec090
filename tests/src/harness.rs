//! # In-process validator network
//!
//! Every validator runs its own [`ConsensusService`] over an
//! [`InMemoryBackend`]. A pump task per validator forwards everything its
//! [`ChannelBroadcaster`] emits to the other validators' ingress, and a
//! commit task turns each committed block into `notify_block_finalized`
//! plus a fresh candidate for the next height.

use anyhow::{bail, Context};
use bft_consensus::test_utils::{signers, EquivocatingBroadcaster, InMemoryBackend, StaticCommitteeProvider};
use bft_consensus::{
    Backend, Behaviour, Broadcaster, ChannelBroadcaster, ConsensusApi, ConsensusConfig, ConsensusHandle,
    ConsensusService, Honest, ServiceDependencies,
};
use bft_telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
use bft_types::{short_hex, Address, Block, Height};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Per-validator setup.
struct NodeSpec {
    behaviour: Arc<dyn Behaviour>,
    equivocate: bool,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            behaviour: Arc::new(Honest),
            equivocate: false,
        }
    }
}

pub struct SimNetworkBuilder {
    config: ConsensusConfig,
    specs: Vec<NodeSpec>,
}

impl SimNetworkBuilder {
    pub fn config(mut self, config: ConsensusConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the outgoing-message strategy of validator `index`.
    pub fn behaviour(mut self, index: usize, behaviour: Arc<dyn Behaviour>) -> Self {
        self.specs[index].behaviour = behaviour;
        self
    }

    /// Make validator `index` sign a conflicting copy of every vote.
    pub fn equivocating(mut self, index: usize) -> Self {
        self.specs[index].equivocate = true;
        self
    }

    /// Spawn every validator. Must be called inside a tokio runtime.
    pub async fn start(self) -> anyhow::Result<SimNetwork> {
        let telemetry = init_telemetry(telemetry_config())?;
        let count = u8::try_from(self.specs.len()).context("too many validators")?;
        let signers = signers(count);
        let addresses: Vec<Address> = signers.iter().map(|s| s.address()).collect();
        let provider = Arc::new(StaticCommitteeProvider::equal(&addresses, 1));

        let mut nodes = Vec::with_capacity(signers.len());
        let mut outbound = Vec::with_capacity(signers.len());
        let mut tasks = Vec::new();

        for (signer, spec) in signers.into_iter().zip(self.specs) {
            let backend = Arc::new(InMemoryBackend::new(signer.clone()));
            let (channel, rx) = ChannelBroadcaster::channel();
            let broadcaster: Arc<dyn Broadcaster> = if spec.equivocate {
                Arc::new(EquivocatingBroadcaster::new(channel, signer.clone()))
            } else {
                Arc::new(channel)
            };
            let deps = ServiceDependencies {
                backend: backend.clone(),
                committee_provider: provider.clone(),
                broadcaster,
                behaviour: spec.behaviour,
                wal: None,
            };
            let (service, handle) = ConsensusService::new(self.config.clone(), deps)?;
            tasks.push(tokio::spawn(async move {
                if let Err(e) = service.run().await {
                    tracing::error!(error = %e, "Validator stopped with error");
                }
            }));
            outbound.push(rx);
            nodes.push(SimNode {
                address: signer.address(),
                handle,
                backend,
            });
        }

        let handles: Vec<ConsensusHandle> = nodes.iter().map(|n| n.handle.clone()).collect();
        for (index, mut rx) in outbound.into_iter().enumerate() {
            let peers: Vec<ConsensusHandle> = handles
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, h)| h.clone())
                .collect();
            tasks.push(tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    for peer in &peers {
                        if let Err(e) = peer.submit_message(message.clone()).await {
                            debug!(from = index, error = %e, "Peer rejected message");
                        }
                    }
                }
            }));
        }

        for (index, node) in nodes.iter().enumerate() {
            let (tx, mut commits) = mpsc::unbounded_channel::<Block>();
            node.backend.set_commit_listener(tx);
            let handle = node.handle.clone();
            let backend = node.backend.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(block) = commits.recv().await {
                    debug!(node = index, height = block.height(), "Block committed");
                    if handle.notify_block_finalized(block).await.is_err() {
                        break;
                    }
                    let next = backend.next_block(candidate_payload(index, head_height(&backend) + 1));
                    if handle.submit_candidate_block(next).await.is_err() {
                        break;
                    }
                }
            }));
            node.handle
                .submit_candidate_block(node.backend.next_block(candidate_payload(index, 1)))
                .await?;
        }

        Ok(SimNetwork {
            nodes,
            tasks,
            telemetry,
        })
    }
}

/// The first network of a test binary installs the subscriber. Quiet
/// unless `BFT_LOG_LEVEL` or `RUST_LOG` asks for more.
fn telemetry_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::for_node("sim");
    if std::env::var("BFT_LOG_LEVEL").is_err() && std::env::var("RUST_LOG").is_err() {
        config.log_level = "warn".to_string();
    }
    config.metrics_enabled = true;
    config
}

fn candidate_payload(index: usize, height: Height) -> Vec<Vec<u8>> {
    vec![format!("node-{index}/height-{height}").into_bytes()]
}

fn head_height(backend: &InMemoryBackend) -> Height {
    backend.head_block().height()
}

pub struct SimNode {
    pub address: Address,
    pub handle: ConsensusHandle,
    pub backend: Arc<InMemoryBackend>,
}

pub struct SimNetwork {
    nodes: Vec<SimNode>,
    tasks: Vec<JoinHandle<()>>,
    telemetry: TelemetryGuard,
}

impl SimNetwork {
    /// `count` honest validators with equal power and the test timeouts.
    pub fn builder(count: usize) -> SimNetworkBuilder {
        SimNetworkBuilder {
            config: ConsensusConfig::fast(),
            specs: (0..count).map(|_| NodeSpec::default()).collect(),
        }
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Wait until every validator in `indices` has committed `height`.
    pub async fn wait_for_height(
        &self,
        indices: &[usize],
        height: Height,
        within: Duration,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let lagging: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| head_height(&self.nodes[i].backend) < height)
                .collect();
            if lagging.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                let heights: Vec<Height> =
                    lagging.iter().map(|&i| head_height(&self.nodes[i].backend)).collect();
                bail!("validators {lagging:?} stuck at heights {heights:?}, wanted {height}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Check that the validators in `indices` committed the same block at
    /// every height they share.
    pub fn assert_agreement(&self, indices: &[usize]) -> anyhow::Result<()> {
        let chains: Vec<Vec<Block>> = indices.iter().map(|&i| self.nodes[i].backend.chain()).collect();
        let shortest = chains.iter().map(Vec::len).min().unwrap_or(0);
        for height in 0..shortest {
            let expected = chains[0][height].hash();
            for (chain, &index) in chains.iter().zip(indices) {
                if chain[height].hash() != expected {
                    bail!(
                        "validator {index} committed {} at height {height}, validator {} committed {}",
                        short_hex(&chain[height].hash()),
                        indices[0],
                        short_hex(&expected)
                    );
                }
            }
        }
        Ok(())
    }

    /// Prometheus text for the process: every validator of every network
    /// in the test binary reports into the same registry.
    pub fn metrics(&self) -> anyhow::Result<String> {
        Ok(self.telemetry.metrics()?.unwrap_or_default())
    }

    /// Stop every validator and its helper tasks.
    pub async fn shutdown(self) {
        for node in &self.nodes {
            let _ = node.handle.shutdown().await;
        }
        for task in self.tasks {
            task.abort();
        }
    }
}
