use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{pow::ProofOfWork, Block, Miner, StopSignal, Transaction, Validator};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn genesis() -> Block {
    Block {
        index: 1,
        timestamp: 1_700_000_000.5,
        transactions: vec![],
        proof: 100,
        previous_hash: "1".into(),
    }
}

fn bench_pow(c: &mut Criterion) {
    let last_hash = genesis().hash();

    c.bench_function("solve_difficulty_4", |b| {
        let miner = Miner::default();
        b.iter(|| miner.solve(100, &last_hash, &StopSignal::new()))
    });

    c.bench_function("valid_proof", |b| {
        let pow = ProofOfWork::default();
        b.iter(|| pow.valid_proof(100, 3336, &last_hash))
    });
}

fn bench_hash_and_validate(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let miner = Miner::with_difficulty(3);
    let mut chain = vec![genesis()];
    for _ in 0..20 {
        let last = chain.last().unwrap();
        let last_hash = last.hash();
        let proof = miner.solve(last.proof, &last_hash, &StopSignal::new()).unwrap();
        let transactions = (0..10)
            .map(|i| Transaction::new(format!("alice-{i}"), "bob", rng.gen_range(1u64..10)))
            .collect();
        chain.push(Block {
            index: last.index + 1,
            timestamp: last.timestamp + 1.0,
            transactions,
            proof,
            previous_hash: last_hash,
        });
    }

    c.bench_function("block_hash_10_txs", |b| {
        let block = &chain[1];
        b.iter(|| block.hash())
    });

    c.bench_function("validate_21_blocks", |b| {
        let validator = Validator::new(miner.proof_of_work());
        b.iter(|| validator.is_valid_chain(&chain))
    });
}

criterion_group!(benches, bench_pow, bench_hash_and_validate);
criterion_main!(benches);
