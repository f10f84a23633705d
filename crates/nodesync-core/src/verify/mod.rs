//! Convergence verification
//!
//! After an upsert, polls independent resolution of the primary record until
//! the answer matches the target set or `2 × TTL` elapses.
//!
//! ## Backoff
//!
//! Every failed attempt adds a uniformly random `[0, TTL/2)` to a running
//! accumulator and sleeps the accumulated total, so waits never shrink. The
//! last sleep is cut short at the deadline, where one final attempt runs.
//!
//! The check is advisory: a timeout never undoes the upsert.
//!
//! ## Preemption
//!
//! [`ConvergenceVerifier::verify_until`] also stops as soon as a caller
//! supplied future completes. The engine uses it to abandon polling when a
//! newer membership change is waiting, since that pass supersedes the set
//! being verified.

use std::sync::Arc;
use std::time::Duration;

use crate::model::{RecordName, TargetAddressSet};
use crate::traits::{AddressResolver, Clock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Deadline multiplier applied to the TTL
pub const DEADLINE_TTL_MULTIPLIER: u32 = 2;

/// Terminal result of a verification run
#[derive(Debug, Clone, PartialEq)]
pub enum Convergence {
    /// Resolution returned the target set
    Converged {
        /// Resolution attempts made, including the successful one
        attempts: u32,
    },
    /// The deadline passed without a matching answer
    TimedOut {
        /// Resolution attempts made
        attempts: u32,
        /// Last successfully resolved answer, if any
        last_observed: Option<TargetAddressSet>,
    },
    /// Shutdown was requested while polling
    Cancelled {
        /// Resolution attempts made
        attempts: u32,
    },
    /// Newer work arrived while polling
    Superseded {
        /// Resolution attempts made
        attempts: u32,
    },
}

/// Monotonic randomized wait accumulator
#[derive(Debug)]
pub struct JitterBackoff {
    rng: StdRng,
    step_ms: u64,
    accumulated: Duration,
}

impl JitterBackoff {
    /// Backoff whose increments are drawn from `[0, ttl/2)`
    pub fn new(ttl: u32, rng: StdRng) -> Self {
        Self {
            rng,
            step_ms: u64::from(ttl) * 1000 / 2,
            accumulated: Duration::ZERO,
        }
    }

    /// Add one random increment and return the new total wait
    pub fn next_wait(&mut self) -> Duration {
        if self.step_ms > 0 {
            self.accumulated += Duration::from_millis(self.rng.gen_range(0..self.step_ms));
        }
        self.accumulated
    }
}

/// Polls external resolution until the published set becomes visible
pub struct ConvergenceVerifier {
    resolver: Arc<dyn AddressResolver>,
    clock: Arc<dyn Clock>,
    seed: Option<u64>,
}

impl ConvergenceVerifier {
    /// Create a verifier with entropy-seeded jitter
    pub fn new(resolver: Arc<dyn AddressResolver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            clock,
            seed: None,
        }
    }

    /// Use a fixed jitter seed (reproducible schedules in tests)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn backoff(&self, ttl: u32) -> JitterBackoff {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        JitterBackoff::new(ttl, rng)
    }

    /// Poll until `primary` resolves to `target`, the deadline passes, or
    /// `cancel` fires
    pub async fn verify(
        &self,
        target: &TargetAddressSet,
        primary: &RecordName,
        ttl: u32,
        cancel: &CancellationToken,
    ) -> Convergence {
        self.verify_until(target, primary, ttl, cancel, std::future::pending())
            .await
    }

    /// Like [`verify`](Self::verify), but returns
    /// [`Convergence::Superseded`] once `preempt` completes
    pub async fn verify_until<F>(
        &self,
        target: &TargetAddressSet,
        primary: &RecordName,
        ttl: u32,
        cancel: &CancellationToken,
        preempt: F,
    ) -> Convergence
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(preempt);
        let deadline =
            self.clock.now() + Duration::from_secs(u64::from(ttl) * u64::from(DEADLINE_TTL_MULTIPLIER));
        let mut backoff = self.backoff(ttl);
        let mut attempts = 0u32;
        let mut last_observed = None;

        loop {
            attempts += 1;

            let resolved = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Convergence::Cancelled { attempts },
                _ = &mut preempt => return Convergence::Superseded { attempts },
                res = self.resolver.resolve(primary) => res,
            };

            match resolved {
                Ok(observed) if observed == *target => {
                    info!(record = %primary, target = %target, attempt = attempts, "DNS converged");
                    return Convergence::Converged { attempts };
                }
                Ok(observed) => {
                    debug!(record = %primary, observed = %observed, target = %target, attempt = attempts, "Not converged yet");
                    last_observed = Some(observed);
                }
                Err(e) => {
                    debug!(record = %primary, attempt = attempts, "Lookup failed: {}", e);
                }
            }

            let now = self.clock.now();
            if now >= deadline {
                warn!(
                    record = %primary,
                    target = %target,
                    observed = %last_observed.clone().unwrap_or_default(),
                    attempts,
                    "DNS did not converge before deadline"
                );
                return Convergence::TimedOut {
                    attempts,
                    last_observed,
                };
            }

            let wait = backoff.next_wait().min(deadline - now);
            debug!(record = %primary, wait_ms = wait.as_millis() as u64, "Waiting before next lookup");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Convergence::Cancelled { attempts },
                _ = &mut preempt => {
                    debug!(record = %primary, attempts, "Verification superseded");
                    return Convergence::Superseded { attempts };
                }
                _ = self.clock.sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
        }
    }

    /// Fails `failures` times, then answers with `answer`
    struct FlakyResolver {
        failures: u32,
        answer: TargetAddressSet,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AddressResolver for FlakyResolver {
        async fn resolve(&self, _name: &RecordName) -> Result<TargetAddressSet> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(Error::resolution("SERVFAIL"))
            } else {
                Ok(self.answer.clone())
            }
        }
    }

    fn primary() -> RecordName {
        RecordName::parse("nodes.example.com").unwrap()
    }

    fn set(addrs: &[&str]) -> TargetAddressSet {
        TargetAddressSet::from_addresses(addrs.iter().copied())
    }

    #[test]
    fn backoff_waits_never_shrink() {
        let mut backoff = JitterBackoff::new(60, StdRng::seed_from_u64(7));
        let mut previous = Duration::ZERO;
        for _ in 0..50 {
            let wait = backoff.next_wait();
            assert!(wait >= previous);
            assert!(wait - previous < Duration::from_secs(30));
            previous = wait;
        }
    }

    #[tokio::test]
    async fn converges_after_transient_failures() {
        let resolver = Arc::new(FlakyResolver {
            failures: 2,
            answer: set(&["1.1.1.1"]),
            calls: AtomicU32::new(0),
        });
        let clock = Arc::new(ManualClock::new());
        let verifier = ConvergenceVerifier::new(resolver, clock).with_seed(1);

        let outcome = verifier
            .verify(&set(&["1.1.1.1"]), &primary(), 300, &CancellationToken::new())
            .await;
        assert_eq!(outcome, Convergence::Converged { attempts: 3 });
    }

    #[tokio::test]
    async fn times_out_within_two_ttls_of_virtual_time() {
        let resolver = Arc::new(FlakyResolver {
            failures: 0,
            answer: set(&["9.9.9.9"]),
            calls: AtomicU32::new(0),
        });
        let clock = Arc::new(ManualClock::new());
        let start = clock.now();
        let verifier = ConvergenceVerifier::new(resolver, clock.clone()).with_seed(42);

        let outcome = verifier
            .verify(&set(&["1.1.1.1"]), &primary(), 10, &CancellationToken::new())
            .await;

        match outcome {
            Convergence::TimedOut {
                attempts,
                last_observed,
            } => {
                assert!(attempts >= 2);
                assert_eq!(last_observed, Some(set(&["9.9.9.9"])));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(clock.now() - start, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn cancelled_token_stops_polling() {
        let resolver = Arc::new(FlakyResolver {
            failures: u32::MAX,
            answer: TargetAddressSet::empty(),
            calls: AtomicU32::new(0),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let verifier = ConvergenceVerifier::new(resolver, Arc::new(ManualClock::new()));
        let outcome = verifier.verify(&set(&["1.1.1.1"]), &primary(), 300, &cancel).await;
        assert!(matches!(outcome, Convergence::Cancelled { .. }));
    }

    /// Clock whose sleeps never finish, so only preemption can end a wait
    struct StalledClock;

    #[async_trait]
    impl Clock for StalledClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await
        }
    }

    #[tokio::test]
    async fn newer_work_preempts_the_wait() {
        let resolver = Arc::new(FlakyResolver {
            failures: 0,
            answer: set(&["9.9.9.9"]),
            calls: AtomicU32::new(0),
        });
        let (newer_tx, newer_rx) = tokio::sync::oneshot::channel::<()>();
        let verifier = ConvergenceVerifier::new(resolver.clone(), Arc::new(StalledClock));

        let preempt = async move {
            let _ = newer_rx.await;
        };
        let desired = set(&["1.1.1.1"]);
        let servers = primary();
        let cancel = CancellationToken::new();
        let verification = verifier.verify_until(&desired, &servers, 300, &cancel, preempt);
        tokio::pin!(verification);

        // First attempt runs, then the verifier parks in its backoff sleep
        tokio::select! {
            biased;
            outcome = &mut verification => panic!("finished early: {:?}", outcome),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        newer_tx.send(()).unwrap();
        assert_eq!(verification.await, Convergence::Superseded { attempts: 1 });
    }

    #[tokio::test]
    async fn cancellation_wins_over_preemption() {
        let resolver = Arc::new(FlakyResolver {
            failures: 0,
            answer: set(&["9.9.9.9"]),
            calls: AtomicU32::new(0),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let verifier = ConvergenceVerifier::new(resolver, Arc::new(ManualClock::new()));
        let outcome = verifier
            .verify_until(&set(&["1.1.1.1"]), &primary(), 300, &cancel, async {})
            .await;
        assert_eq!(outcome, Convergence::Cancelled { attempts: 1 });
    }
}
