//! # Message Store Benchmarks
//!
//! | Operation | Target |
//! |-----------|--------|
//! | Add a vote and tally its value | < 1µs |
//! | Quorum search over a full round | < 10µs at 100 members |
//! | Commit seal from precommits | < 50µs at 100 members |

use bft_consensus::domain::{AggregateSeal, MessageMap, RecordedVote, VoteKind};
use bft_consensus::MAX_ROUND;
use bft_types::{Hash, Signature, NIL_VALUE};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn vote(index: usize, value: Hash) -> RecordedVote {
    RecordedVote {
        index,
        sender: [index as u8; 20],
        value,
        power: 1,
        signature: Signature::default(),
    }
}

fn value_for(index: usize) -> Hash {
    // Two thirds for one value, the rest split with nil.
    match index % 3 {
        0 | 1 => [7u8; 32],
        _ => NIL_VALUE,
    }
}

fn bench_add_votes(c: &mut Criterion) {
    let mut group = c.benchmark_group("message-store-add");
    for size in [4usize, 21, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("prevotes", size), &size, |b, &size| {
            b.iter(|| {
                let mut map = MessageMap::new(size, MAX_ROUND);
                let rm = map.get_or_create(0).unwrap();
                for index in 0..size {
                    black_box(rm.add_prevote(vote(index, value_for(index))).unwrap());
                }
                black_box(rm.prevotes_power(&[7u8; 32]))
            })
        });
    }
    group.finish();
}

fn bench_quorum_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("message-store-quorum");
    for size in [4usize, 21, 100] {
        let mut map = MessageMap::new(size, MAX_ROUND);
        let rm = map.get_or_create(3).unwrap();
        for index in 0..size {
            rm.add_prevote(vote(index, value_for(index))).unwrap();
            rm.add_precommit(vote(index, value_for(index))).unwrap();
        }
        let quorum = (2 * size as u128).div_ceil(3);

        group.bench_with_input(BenchmarkId::new("search", size), &size, |b, _| {
            let rm = map.get(3).unwrap().unwrap();
            b.iter(|| black_box(rm.search_quorum(VoteKind::Prevote, &NIL_VALUE, quorum)))
        });

        group.bench_with_input(BenchmarkId::new("seal", size), &size, |b, &size| {
            let rm = map.get(3).unwrap().unwrap();
            b.iter(|| {
                let precommits = rm.precommits_for(&[7u8; 32]);
                black_box(AggregateSeal::from_precommits(1, 3, [7u8; 32], size, &precommits))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add_votes, bench_quorum_search);
criterion_main!(benches);
