//! Resilience core benchmarks
//!
//! Breaker admission and recording paths, retry loop outcomes, backoff delay
//! computation and budget checks.
//!
//! Run with: `cargo bench --bench resilience_bench -p resilience-core`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resilience_core::{
    CircuitBreaker, CircuitBreakerConfig, HalfOpenAccounting, MockClock, ResilienceError,
    RetryBudget, RetryConfig, RetryExecutor, RetryMetrics, SeededJitter, ThreadRngJitter,
};
use tokio::runtime::Builder as RuntimeBuilder;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BenchError(&'static str);

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_sync_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_sync_paths");

    group.bench_function("call_success", |b| {
        let breaker = CircuitBreaker::with_defaults();
        b.iter(|| {
            let result: Result<_, ResilienceError<BenchError>> = breaker.call(|| Ok(()));
            if let Err(err) = result {
                panic!("circuit breaker success path failed: {err}");
            }
        });
    });

    group.bench_function("call_fail_to_open", |b| {
        b.iter(|| {
            let breaker = CircuitBreaker::with_defaults();
            for _ in 0..5 {
                let result = breaker.call(|| Err::<(), _>(BenchError("benchmark failure")));
                let _result = black_box(result);
            }
            black_box(breaker.get_state());
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .success_threshold(1)
            .max_requests(1)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = CircuitBreaker::new(config).expect("breaker should build");

        let _ = breaker.call(|| Err::<(), _>(BenchError("initial failure")));

        b.iter(|| {
            let result: Result<_, ResilienceError<BenchError>> = breaker.call(|| Ok(()));
            let _result = black_box(result);
        });
    });

    group.finish();
}

fn bench_circuit_breaker_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_state_machine");

    for accounting in [HalfOpenAccounting::OnAdmission, HalfOpenAccounting::OnSuccess] {
        group.bench_with_input(
            BenchmarkId::new("open_half_open_recover", format!("{accounting:?}")),
            &accounting,
            |b, &accounting| {
                b.iter(|| {
                    let clock = MockClock::new();
                    let breaker = CircuitBreakerConfig::builder()
                        .clock(clock.clone())
                        .failure_threshold(3)
                        .success_threshold(2)
                        .max_requests(2)
                        .timeout(Duration::from_millis(10))
                        .half_open_accounting(accounting)
                        .build()
                        .expect("breaker should build with mock clock");

                    for _ in 0..3 {
                        let _ = breaker.call(|| Err::<(), _>(BenchError("state transition")));
                    }
                    clock.advance(Duration::from_millis(10));

                    let _ = breaker.call(|| Ok::<_, BenchError>(()));
                    let _ = breaker.call(|| Ok::<_, BenchError>(()));

                    black_box(breaker.get_stats());
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn zero_delay(max_attempts: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_attempts(max_attempts)
        .initial_delay(Duration::ZERO)
        .max_delay(Duration::ZERO)
        .no_jitter()
        .build()
        .expect("retry config should build for benchmarks")
}

fn bench_retry_executor_outcomes(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_executor_outcomes");
    let runtime = build_runtime();
    let executor = RetryExecutor::new();
    let cancel = CancellationToken::new();

    group.bench_function("immediate_success", |b| {
        let config = zero_delay(3);
        b.to_async(&runtime).iter(|| async {
            let result = executor.retry(&cancel, &config, || async { Ok::<_, BenchError>(()) }).await;
            if let Err(err) = result {
                panic!("retry immediate success failed: {err}");
            }
        });
    });

    group.bench_function("transient_failures_then_success", |b| {
        let config = zero_delay(5);
        b.to_async(&runtime).iter(|| async {
            let mut remaining_failures = 3u32;
            let result = executor
                .retry(&cancel, &config, move || {
                    let fail_now = remaining_failures > 0;
                    if fail_now {
                        remaining_failures -= 1;
                    }
                    async move {
                        if fail_now {
                            Err(BenchError("transient failure"))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await;

            if let Err(err) = result {
                panic!("retry transient failure path exhausted: {err}");
            }
        });
    });

    group.bench_function("always_fail_with_budget", |b| {
        let config = zero_delay(4);
        b.to_async(&runtime).iter(|| async {
            let budget = RetryBudget::new(3);
            let result = executor
                .retry_with_budget(&cancel, &config, Some(&budget), || async {
                    Err::<(), _>(BenchError("permanent failure"))
                })
                .await;
            let _result = black_box(result);
        });
    });

    group.finish();
}

fn bench_retry_backoff_calculations(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff_calculations");

    let configs = [
        ("default", RetryConfig::default()),
        ("exponential", RetryConfig::exponential_backoff(10)),
        ("no_jitter", RetryConfig { jitter: false, ..RetryConfig::exponential_backoff(10) }),
    ];

    for (name, config) in configs {
        group.bench_with_input(BenchmarkId::new("next_delay", name), &config, |b, config| {
            let seeded = SeededJitter::new(42);
            b.iter(|| {
                let mut delay = None;
                for _ in 0..10 {
                    delay = Some(config.next_delay(delay, &seeded));
                }
                black_box(delay);
            });
        });
    }

    group.bench_function("thread_rng_next_delay", |b| {
        let config = RetryConfig::default();
        b.iter(|| black_box(config.next_delay(Some(Duration::from_millis(100)), &ThreadRngJitter)));
    });

    group.finish();
}

fn bench_budget_and_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_and_metrics");

    group.bench_function("budget_can_retry", |b| {
        let budget = RetryBudget::new(u32::MAX);
        b.iter(|| black_box(budget.can_retry()));
    });

    group.bench_function("budget_exhausted_check", |b| {
        let budget = RetryBudget::new(0);
        b.iter(|| black_box(budget.can_retry()));
    });

    group.bench_function("metrics_record_and_snapshot", |b| {
        let metrics = RetryMetrics::new();
        b.iter(|| {
            metrics.record_attempt();
            metrics.record_retry();
            black_box(metrics.snapshot());
        });
    });

    group.finish();
}

criterion_group!(
    resilience,
    bench_circuit_breaker_sync_paths,
    bench_circuit_breaker_state_machine,
    bench_retry_executor_outcomes,
    bench_retry_backoff_calculations,
    bench_budget_and_metrics
);
criterion_main!(resilience);
