use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use nback_core::{score, Condition, Response};

const LETTERS: &str = "bcDfgGhkLmnNpqrsStvwxYzbc";

/// Scores a full 25-letter block with every trial answered as a target.
pub fn bench_score_block(c: &mut Criterion) {
    let letters: Vec<char> = LETTERS.chars().collect();
    let mut group = c.benchmark_group("score_block");

    for condition in Condition::ALL {
        group.bench_with_input(
            BenchmarkId::from_parameter(condition),
            &condition,
            |b, &condition| {
                b.iter(|| {
                    letters
                        .iter()
                        .enumerate()
                        .filter(|&(i, &letter)| {
                            score(
                                black_box(condition),
                                i,
                                letter,
                                &letters[..i],
                                Response::Target,
                            )
                        })
                        .count()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_score_block);
criterion_main!(benches);
