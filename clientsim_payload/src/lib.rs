//! The clientsim payloads
//!
//! This library supports payload generation for the clientsim project. Today
//! that is a single payload, the feature-vector log record, see
//! [`FeatureLog`].

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

use std::io::{self, Write};

use rand::Rng;

pub use feature_log::FeatureLog;

pub mod feature_log;

/// Errors related to serialization
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// IO operation failed
    #[error("IO operation failed: {0}")]
    Io(#[from] io::Error),
}

/// To serialize into bytes
pub trait Serialize {
    /// Generate one payload from `rng` and write its bytes into `writer`.
    ///
    /// # Errors
    ///
    /// Errors come from the writer refusing bytes.
    fn to_bytes<W, R>(&self, rng: R, writer: &mut W) -> Result<(), Error>
    where
        R: Rng + Sized,
        W: Write;
}
