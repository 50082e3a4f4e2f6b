//! Launch and join the producer pool.
//!
//! The orchestrator starts one [`Producer`] per configured worker, each with
//! its own identity counting from 1, and waits for all of them to stop. It has
//! no view of individual sends; a producer that ends in error is logged and
//! counted, the others carry on.

use std::time::{SystemTime, UNIX_EPOCH};

use clientsim_signal::{RegisterError, Watcher};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span};

use crate::{
    config::Config,
    producer::{Producer, Report},
};

#[derive(thiserror::Error, Debug, Clone, Copy)]
/// Errors produced by [`Orchestrator`].
pub enum Error {
    /// A producer could not be launched, the run is abandoned.
    #[error("Failed to launch producer {id}: {source}")]
    Launch {
        /// Identity of the producer that failed to launch
        id: u32,
        /// Underlying registration error
        #[source]
        source: RegisterError,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// The outcome of a run, known once every producer has stopped.
pub struct Summary {
    /// One report per producer that ran to shutdown, ordered by identity
    pub reports: Vec<Report>,
    /// Producers that ended in error or could not be joined
    pub abandoned: u32,
}

impl Summary {
    /// Records attempted across all producers.
    #[must_use]
    pub fn messages(&self) -> u64 {
        self.reports.iter().map(|r| r.messages).sum()
    }

    /// Records whose send failed across all producers.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.reports.iter().map(|r| r.failures).sum()
    }
}

/// Seed drawn from the wall clock, nanoseconds since the epoch.
#[allow(clippy::cast_possible_truncation)]
fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[derive(Debug)]
/// Runs the producer pool.
pub struct Orchestrator {
    config: Config,
    run_seed: u64,
}

impl Orchestrator {
    /// Create a new [`Orchestrator`]. The run seed is taken from `config` or,
    /// absent there, from the clock.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let run_seed = config.seed.unwrap_or_else(clock_seed);
        info!("Run seed {run_seed}");
        Self { config, run_seed }
    }

    /// Number of producers this orchestrator launches.
    #[must_use]
    pub fn workers(&self) -> u16 {
        self.config.workers.get()
    }

    /// Launch every producer and wait for all of them to stop.
    ///
    /// Producers stop when `shutdown` is signaled. This function returns only
    /// once every launched producer has exited and released its HTTP client.
    ///
    /// # Errors
    ///
    /// Function will return an error if a producer cannot be launched because
    /// shutdown was already signaled. Producers launched before the failure
    /// are not waited on.
    pub async fn run(self, shutdown: Watcher) -> Result<Summary, Error> {
        let mut producers = JoinSet::new();
        for id in 1..=u32::from(self.config.workers.get()) {
            let watcher = shutdown
                .register()
                .map_err(|source| Error::Launch { id, source })?;
            let producer = Producer::new(id, &self.config, self.run_seed, watcher);
            producers.spawn(producer.spin().instrument(info_span!("producer", id)));
        }
        // Only the producers' watchers matter from here on.
        drop(shutdown);

        let mut summary = Summary::default();
        while let Some(res) = producers.join_next().await {
            match res {
                Ok(Ok(report)) => {
                    debug!(
                        "producer {id} stopped after {messages} messages, {failures} failed",
                        id = report.id,
                        messages = report.messages,
                        failures = report.failures,
                    );
                    summary.reports.push(report);
                }
                Ok(Err(err)) => {
                    error!("Producer shut down unexpectedly: {err}");
                    summary.abandoned += 1;
                }
                Err(err) => {
                    error!("Could not join the spawned producer task: {err}");
                    summary.abandoned += 1;
                }
            }
        }
        summary.reports.sort_by_key(|report| report.id);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroU16, time::Duration};

    use http::StatusCode;
    use serde::Deserialize;
    use tokio::time::{Instant, sleep, timeout};

    use super::{Error, Orchestrator};
    use crate::{
        config::{Config, Interval},
        stub::Stub,
    };

    #[derive(Deserialize)]
    struct Record {
        message: Inner,
        key: String,
    }

    #[derive(Deserialize)]
    struct Inner {
        emp_id: u32,
        features: Vec<f64>,
    }

    fn fast_config(stub: &Stub) -> Config {
        Config {
            target_uri: stub.uri(),
            interval: Interval::new(
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(1),
            ),
            seed: Some(42),
            ..Config::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_endpoint_run_ends_cleanly_after_stop() {
        let stub = Stub::start(StatusCode::INTERNAL_SERVER_ERROR).await;
        let orchestrator = Orchestrator::new(fast_config(&stub));
        assert_eq!(orchestrator.workers(), 5);

        let (watcher, broadcaster) = clientsim_signal::signal();
        let run = tokio::spawn(orchestrator.run(watcher));

        // Wait for producer 3 to show up, then keep going so every producer
        // sees a few failures.
        timeout(Duration::from_secs(5), async {
            while !stub
                .received()
                .iter()
                .any(|r| r.body.ends_with(br#""key": "thread_3"}"#))
            {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("producer 3 never sent");
        stub.wait_for(20).await;

        let stopped_at = Instant::now();
        broadcaster.signal();
        let summary = timeout(Duration::from_secs(2), run)
            .await
            .expect("run did not end after stop")
            .unwrap()
            .unwrap();
        assert!(stopped_at.elapsed() < Duration::from_secs(2));

        let received = stub.received();
        let first_of_three = received
            .iter()
            .find(|r| r.body.ends_with(br#""key": "thread_3"}"#))
            .unwrap();
        let text = std::str::from_utf8(&first_of_three.body).unwrap();
        assert!(text.starts_with(r#"{"message": {"emp_id": 3, "features": ["#));
        let record: Record = serde_json::from_str(text).unwrap();
        assert_eq!(record.key, "thread_3");
        assert_eq!(record.message.emp_id, 3);
        assert_eq!(record.message.features.len(), 8);

        assert_eq!(summary.abandoned, 0);
        let ids: Vec<u32> = summary.reports.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        for report in &summary.reports {
            assert!(report.messages >= 1);
            assert_eq!(report.failures, report.messages);
        }
        assert_eq!(summary.messages(), received.len() as u64);
        assert_eq!(summary.failures(), summary.messages());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_producer_uses_its_own_key() {
        let stub = Stub::start(StatusCode::OK).await;
        let config = Config {
            workers: NonZeroU16::new(3).unwrap(),
            ..fast_config(&stub)
        };
        let (watcher, broadcaster) = clientsim_signal::signal();
        let run = tokio::spawn(Orchestrator::new(config).run(watcher));

        stub.wait_for(15).await;
        broadcaster.signal();
        let summary = timeout(Duration::from_secs(2), run)
            .await
            .expect("run did not end after stop")
            .unwrap()
            .unwrap();

        for request in stub.received() {
            let record: Record = serde_json::from_slice(&request.body).unwrap();
            assert!((1..=3).contains(&record.message.emp_id));
            assert_eq!(record.key, format!("thread_{}", record.message.emp_id));
        }
        assert_eq!(summary.reports.len(), 3);
        assert_eq!(summary.failures(), 0);
    }

    #[tokio::test]
    async fn launch_after_stop_fails() {
        let stub = Stub::start(StatusCode::OK).await;
        let (watcher, broadcaster) = clientsim_signal::signal();
        broadcaster.signal();

        let result = Orchestrator::new(fast_config(&stub)).run(watcher).await;
        assert!(matches!(result, Err(Error::Launch { id: 1, .. })));
        assert!(stub.received().is_empty());
    }

    #[tokio::test]
    async fn producer_failures_do_not_fail_the_run() {
        let config = Config {
            target_uri: "https://localhost:3000/log".parse().unwrap(),
            seed: Some(7),
            ..Config::default()
        };
        let (watcher, _broadcaster) = clientsim_signal::signal();

        let summary = timeout(
            Duration::from_secs(2),
            Orchestrator::new(config).run(watcher),
        )
        .await
        .expect("run did not end")
        .unwrap();
        assert!(summary.reports.is_empty());
        assert_eq!(summary.abandoned, 5);
    }
}
