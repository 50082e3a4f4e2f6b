//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program.
//!
//! clientsim is deliberately not configurable in what it sends or where. The
//! defaults of [`Config`] are the program's fixed parameters. Only ambient
//! knobs, see the `clientsim` binary, are adjusted from the command line.

use std::{num::NonZeroU16, time::Duration};

use http::{HeaderMap, HeaderValue, Uri, header::CONTENT_TYPE};
use rand::Rng;

/// Endpoint every producer posts to.
pub const TARGET_URI: &str = "http://localhost:3000/log";
/// Number of concurrent producers.
// Checked at compile time.
pub const WORKERS: NonZeroU16 = NonZeroU16::new(5).unwrap();

/// Lower bound of the pause between two sends of a producer, inclusive.
const INTERVAL_MIN: Duration = Duration::from_secs(1);
/// Upper bound of the pause between two sends of a producer, inclusive.
const INTERVAL_MAX: Duration = Duration::from_secs(2);
/// Pauses are whole seconds: 1s or 2s, equally likely.
const INTERVAL_STEP: Duration = Duration::from_secs(1);

fn default_headers() -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    map
}

#[derive(Debug, Clone, PartialEq)]
/// Main configuration struct for this program
pub struct Config {
    /// The URI producers post to
    pub target_uri: Uri,
    /// Headers attached to every request
    pub headers: HeaderMap,
    /// The number of producers to run
    pub workers: NonZeroU16,
    /// The pause between two sends of one producer
    pub interval: Interval,
    /// Upper bound on a single request, `None` to wait on the transport
    /// indefinitely
    pub request_timeout: Option<Duration>,
    /// The seed all producer seeds are derived from, `None` to derive it from
    /// the clock at start-up
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_uri: Uri::from_static(TARGET_URI),
            headers: default_headers(),
            workers: WORKERS,
            interval: Interval::default(),
            request_timeout: None,
            seed: None,
        }
    }
}

/// An inclusive range `[min, max]` of pauses. Sampled pauses are `min` plus a
/// whole number of `step`, every such value equally likely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    min: Duration,
    max: Duration,
    step: Duration,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            min: INTERVAL_MIN,
            max: INTERVAL_MAX,
            step: INTERVAL_STEP,
        }
    }
}

impl Interval {
    /// Construct a new `Interval`. Bounds given out of order are swapped.
    #[must_use]
    pub fn new(min: Duration, max: Duration, step: Duration) -> Self {
        if max < min {
            Self {
                min: max,
                max: min,
                step,
            }
        } else {
            Self { min, max, step }
        }
    }

    /// The inclusive lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// The inclusive upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a pause. An interval with no room for a single step, or a zero
    /// step, always yields its lower bound.
    pub fn sample<R>(&self, rng: &mut R) -> Duration
    where
        R: Rng + ?Sized,
    {
        if self.step.is_zero() {
            return self.min;
        }
        let steps = (self.max - self.min).as_nanos() / self.step.as_nanos();
        let steps = u32::try_from(steps).unwrap_or(u32::MAX);
        if steps == 0 {
            return self.min;
        }
        // step * steps never exceeds max - min.
        self.min + self.step * rng.random_range(0..=steps)
    }
}
