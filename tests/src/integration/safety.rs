//! # Safety
//!
//! A Byzantine member that signs two votes at every step must never make
//! honest validators commit different blocks at the same height.

#[cfg(test)]
mod tests {
    use crate::harness::SimNetwork;
    use bft_consensus::test_utils::{signed, signers, Silent};
    use bft_consensus::{ConsensusApi, Payload, ServiceError, Vote};
    use bft_types::NIL_VALUE;
    use std::sync::Arc;
    use std::time::Duration;

    const WITHIN: Duration = Duration::from_secs(20);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_equivocating_member_cannot_split_honest_validators() -> anyhow::Result<()> {
        let network = SimNetwork::builder(4).equivocating(3).start().await?;

        network.wait_for_height(&[0, 1, 2], 3, WITHIN).await?;
        network.assert_agreement(&[0, 1, 2, 3])?;

        for index in 0..3 {
            for commit in network.node(index).backend.commits() {
                assert!(commit.seal.power >= 3);
                assert_eq!(commit.seal.signer_count(), commit.seal.signatures.len());
            }
        }

        network.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_seven_validators_with_two_faulty() -> anyhow::Result<()> {
        // total 7: quorum 5, f 2
        let network = SimNetwork::builder(7)
            .equivocating(5)
            .equivocating(6)
            .start()
            .await?;

        network.wait_for_height(&[0, 1, 2, 3, 4], 2, WITHIN).await?;
        network.assert_agreement(&[0, 1, 2, 3, 4, 5, 6])?;
        for commit in network.node(0).backend.commits() {
            assert!(commit.seal.power >= 5);
        }

        network.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outsider_votes_rejected_at_ingress() -> anyhow::Result<()> {
        // Nobody speaks, so the network stays at height 1.
        let mut builder = SimNetwork::builder(4);
        for index in 0..4 {
            builder = builder.behaviour(index, Arc::new(Silent));
        }
        let network = builder.start().await?;

        // Seeds above the committee's produce keys outside it.
        let outsider = signers(9).into_iter().find(|s| {
            (0..network.len()).all(|i| network.node(i).address != s.address())
        });
        let outsider = outsider.expect("nine seeds yield an outsider");
        let vote = signed(&outsider, Payload::Vote(Vote::prevote(1, 0, NIL_VALUE)));
        let result = network.node(0).handle.submit_message(vote.to_signed()).await;
        assert!(matches!(result, Err(ServiceError::Ingress(_))));

        network.shutdown().await;
        Ok(())
    }
}
