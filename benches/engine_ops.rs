use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;
use twenty48::engine::{start_states, Move, State};

fn corpus<const N: usize>(seed: u64) -> Vec<State<N>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut states = Vec::new();
    let mut s = State::<N>::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    states.push(s);
    for i in 0..64 {
        let next = s.shift(Move::ALL[i % 4]);
        s = if next == s || next.is_lose() {
            State::<N>::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng)
        } else {
            next.with_random_tile(&mut rng)
        };
        states.push(s);
    }
    states
}

fn bench_shift(c: &mut Criterion) {
    let states = corpus::<4>(1337);
    c.bench_function("engine/shift_4x4", |b| {
        b.iter(|| {
            let mut acc = 0u64;
            for &s in &states {
                for mv in Move::ALL {
                    acc ^= s.shift(mv).raw();
                }
            }
            black_box(acc)
        })
    });
}

fn bench_canonicalize(c: &mut Criterion) {
    let states = corpus::<4>(7);
    c.bench_function("engine/canonicalize_4x4", |b| {
        b.iter(|| states.iter().fold(0u64, |acc, s| acc ^ s.canonicalize().raw()))
    });
    let small = corpus::<3>(7);
    c.bench_function("engine/canonicalize_3x3", |b| {
        b.iter(|| small.iter().fold(0u64, |acc, s| acc ^ s.canonicalize().raw()))
    });
}

fn bench_transitions(c: &mut Criterion) {
    let states = corpus::<4>(42);
    c.bench_function("engine/random_transitions_4x4", |b| {
        b.iter(|| {
            let mut n = 0usize;
            for &s in &states {
                for (_, after) in s.legal_moves() {
                    n += after.random_transitions().len();
                }
            }
            black_box(n)
        })
    });
    c.bench_function("engine/start_states_4x4", |b| b.iter(|| black_box(start_states::<4>().len())));
}

criterion_group!(engine_ops, bench_shift, bench_canonicalize, bench_transitions);
criterion_main!(engine_ops);
