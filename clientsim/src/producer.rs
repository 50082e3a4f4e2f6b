//! The HTTP producer.
//!
//! A producer posts one feature-vector record to the target, pauses for a
//! random interval and repeats until the shutdown signal is received. Sends are
//! fire-and-forget: a failed send is logged and counted, never retried, and
//! never ends the producer.
//!
//! Each producer owns its HTTP client, see [`Transport`], and its random
//! stream. Nothing is shared between producers except the shutdown signal.

use std::time::Duration;

use bytes::Bytes;
use clientsim_payload::{FeatureLog, Serialize};
use http::{HeaderMap, Method, Request, StatusCode, Uri, header::CONTENT_LENGTH, uri::Scheme};
use http_body_util::Full;
use hyper_util::{
    client::legacy::{self, Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rand::{SeedableRng, rngs::StdRng};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::{Config, Interval};

/// Initial capacity of a record buffer, comfortably above a record's size.
const RECORD_CAPACITY: usize = 256;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Producer`]. Any of these ends the producer.
pub enum Error {
    /// The target cannot be reached with a plain HTTP client.
    #[error("Target URI {0} must be an absolute http URI")]
    UnsupportedScheme(Uri),
}

#[derive(thiserror::Error, Debug)]
/// Errors produced by a single send. None of these end the producer.
pub enum SendError {
    /// Wrapper around [`http::Error`].
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
    /// Creation of the record failed.
    #[error("Payload error: {0}")]
    Payload(#[from] clientsim_payload::Error),
    /// The request did not complete.
    #[error("{source}{detail}")]
    Request {
        /// Underlying client error
        #[source]
        source: legacy::Error,
        /// The cause the client error wraps, if any, pre-rendered
        detail: String,
    },
    /// The request did not complete in the configured time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The target answered with a non-success status.
    #[error("Target responded with {0}")]
    Status(StatusCode),
}

impl From<legacy::Error> for SendError {
    fn from(source: legacy::Error) -> Self {
        // The client error on its own reads "client error (Connect)", the
        // interesting part lives one level down.
        let detail = std::error::Error::source(&source)
            .map_or_else(String::new, |cause| format!(": {cause}"));
        Self::Request { source, detail }
    }
}

/// The HTTP client handle of one producer.
///
/// Acquired once when the producer starts and released when dropped, on every
/// exit path of the producer including cancellation of its task.
#[derive(Debug)]
pub(crate) struct Transport {
    client: Client<HttpConnector, Full<Bytes>>,
    uri: Uri,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl Transport {
    /// Acquire a client for `uri`, attaching `headers` to every request.
    ///
    /// # Errors
    ///
    /// Function will error if `uri` is not an absolute `http` URI.
    pub(crate) fn acquire(
        uri: &Uri,
        headers: &HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        if uri.scheme() != Some(&Scheme::HTTP) || uri.authority().is_none() {
            return Err(Error::UnsupportedScheme(uri.clone()));
        }

        // One producer has at most one request in flight, a single pooled
        // connection is all it can use.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(1)
            .retry_canceled_requests(false)
            .build_http();
        debug!("acquired HTTP client for {uri}");

        Ok(Self {
            client,
            uri: uri.clone(),
            headers: headers.clone(),
            timeout,
        })
    }

    /// POST `body` to the target.
    ///
    /// The response body is not read, only the status is consulted.
    ///
    /// # Errors
    ///
    /// Function will error if the request cannot be built, does not complete,
    /// times out or is answered with a non-2xx status.
    pub(crate) async fn send(&self, body: Bytes) -> Result<StatusCode, SendError> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(&self.uri)
            .header(CONTENT_LENGTH, body.len())
            .body(Full::new(body))?;
        request.headers_mut().extend(self.headers.clone());

        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.client.request(request))
                .await
                .map_err(|_| SendError::Timeout(limit))??,
            None => self.client.request(request).await?,
        };

        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(SendError::Status(status))
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        info!("Cleaning up.");
    }
}

/// Derive the seed of producer `id` from the run seed. Distinct ids yield
/// distinct seeds for any run seed.
#[must_use]
pub fn seed_for(run_seed: u64, id: u32) -> u64 {
    // Odd multiplier, the map id -> id * K is a bijection on u64.
    run_seed ^ u64::from(id).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What a producer did over its lifetime.
pub struct Report {
    /// The producer identity
    pub id: u32,
    /// Records attempted, the number of the last record
    pub messages: u64,
    /// Records whose send failed
    pub failures: u64,
}

/// The HTTP producer.
///
/// This producer is responsible for posting feature-vector records to the
/// target until shutdown.
#[derive(Debug)]
pub struct Producer {
    id: u32,
    rng: StdRng,
    payload: FeatureLog,
    uri: Uri,
    headers: HeaderMap,
    request_timeout: Option<Duration>,
    interval: Interval,
    shutdown: clientsim_signal::Watcher,
}

impl Producer {
    /// Create a new [`Producer`] instance with identity `id`, counting from 1.
    #[must_use]
    pub fn new(
        id: u32,
        config: &Config,
        run_seed: u64,
        shutdown: clientsim_signal::Watcher,
    ) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed_for(run_seed, id)),
            payload: FeatureLog::new(id),
            uri: config.target_uri.clone(),
            headers: config.headers.clone(),
            request_timeout: config.request_timeout,
            interval: config.interval,
            shutdown,
        }
    }

    /// Run [`Producer`] until a shutdown signal is received.
    ///
    /// A stop requested while a send is in flight is observed once that send
    /// completes. A stop requested during the pause cuts the pause short. No
    /// new send starts once the stop is observed.
    ///
    /// # Errors
    ///
    /// Function will return an error, without sending anything, if the HTTP
    /// client cannot be acquired for the configured target.
    pub async fn spin(mut self) -> Result<Report, Error> {
        let transport = match Transport::acquire(&self.uri, &self.headers, self.request_timeout)
        {
            Ok(transport) => transport,
            Err(err) => {
                error!("Failed to acquire HTTP client: {err}");
                return Err(err);
            }
        };

        let mut report = Report {
            id: self.id,
            messages: 0,
            failures: 0,
        };

        while self.shutdown.is_running() {
            report.messages += 1;

            let mut record = Vec::with_capacity(RECORD_CAPACITY);
            let sent = match self.payload.to_bytes(&mut self.rng, &mut record) {
                Ok(()) => transport.send(Bytes::from(record)).await,
                Err(err) => Err(err.into()),
            };
            match sent {
                Ok(_) => info!("Sent msg {}", report.messages),
                Err(err) => {
                    report.failures += 1;
                    error!("Failed: {err}");
                }
            }

            let pause = self.interval.sample(&mut self.rng);
            tokio::select! {
                () = sleep(pause) => {},
                () = self.shutdown.recv() => {
                    debug!("shutdown signal received");
                },
            }
        }

        drop(transport);
        Ok(report)
    }
}
