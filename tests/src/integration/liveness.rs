//! # Liveness
//!
//! Four equal-power validators tolerate one faulty member (f = 1). These
//! runs check that heights keep being decided when everyone is honest,
//! when the first proposer never speaks and when one member always votes
//! nil.

#[cfg(test)]
mod tests {
    use crate::harness::SimNetwork;
    use bft_consensus::test_utils::{AlwaysNil, Silent};
    use bft_consensus::{Committee, ConsensusApi};
    use std::sync::Arc;
    use std::time::Duration;

    const WITHIN: Duration = Duration::from_secs(20);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_honest_network_decides_consecutive_heights() -> anyhow::Result<()> {
        let network = SimNetwork::builder(4).start().await?;

        network.wait_for_height(&[0, 1, 2, 3], 3, WITHIN).await?;
        network.assert_agreement(&[0, 1, 2, 3])?;

        for index in 0..network.len() {
            let commits = network.node(index).backend.commits();
            assert!(commits.len() >= 3);
            for commit in &commits {
                assert!(commit.seal.power >= 3, "seal below quorum");
                assert_eq!(commit.seal.value, commit.block.hash());
            }
        }
        // Proposers rotate: the first three blocks come from three validators.
        let chain = network.node(0).backend.chain();
        let proposers: Vec<_> = chain[1..=3].iter().map(|b| b.header.proposer).collect();
        assert_ne!(proposers[0], proposers[1]);
        assert_ne!(proposers[1], proposers[2]);

        let metrics = network.metrics()?;
        assert!(metrics.contains("bft_commits_total"));
        assert!(metrics.contains("bft_rounds_started_total"));

        network.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_silent_first_proposer_is_skipped() -> anyhow::Result<()> {
        let network = SimNetwork::builder(4)
            .behaviour(0, Arc::new(Silent))
            .start()
            .await?;

        network.wait_for_height(&[1, 2, 3], 2, WITHIN).await?;
        network.assert_agreement(&[0, 1, 2, 3])?;

        let first = &network.node(1).backend.commits()[0];
        assert!(first.round >= 1, "validator 0 proposes round 0 and is silent");
        assert!(!first.seal.has_signed(0));
        assert_ne!(first.block.header.proposer, network.node(0).address);

        network.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nil_voting_member_does_not_block_progress() -> anyhow::Result<()> {
        let network = SimNetwork::builder(4)
            .behaviour(2, Arc::new(AlwaysNil))
            .start()
            .await?;

        network.wait_for_height(&[0, 1, 3], 3, WITHIN).await?;
        network.assert_agreement(&[0, 1, 2, 3])?;

        for commit in network.node(0).backend.commits() {
            assert!(!commit.seal.has_signed(2), "nil precommits never enter a seal");
        }

        network.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshots_follow_the_network() -> anyhow::Result<()> {
        let network = SimNetwork::builder(4).start().await?;
        network.wait_for_height(&[0, 1, 2, 3], 2, WITHIN).await?;

        // Finalization reaches the service after the backend commit.
        let handle = &network.node(3).handle;
        let snapshot = tokio::time::timeout(WITHIN, async {
            loop {
                let snapshot = handle.snapshot().await;
                if snapshot.height >= 3 {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await?;
        assert_eq!(snapshot.committee_size, 4);
        assert_eq!(snapshot.quorum, 3);
        assert!(snapshot.to_json()?.contains("\"committee_size\": 4"));
        let view = network.node(3).handle.view();
        assert_eq!(view.committee.quorum(), 3);

        network.shutdown().await;
        Ok(())
    }
}
