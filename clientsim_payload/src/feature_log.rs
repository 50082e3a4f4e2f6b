//! Feature-vector log payload.
//!
//! Each record is a single JSON object of the form
//!
//! ```text
//! {"message": {"emp_id": 3, "features": [7, 0.30, 0.50, 1.00, 0.21, 0.10, 0.04, 0.00]}, "key": "thread_3"}
//! ```
//!
//! The spacing and the two-decimal rendering of the float features are part of
//! the wire format. Downstream consumers compare bodies byte for byte, so the
//! record is written by hand rather than through a JSON serializer.

use std::io::Write;

use rand::{Rng, distr::StandardUniform, prelude::Distribution};

use crate::Error;

/// Exclusive upper bound of the integer feature.
pub const CATEGORY_BOUND: u8 = 20;
/// Number of float features following the integer feature.
pub const SIGNALS: usize = 7;

const HALF: f64 = 0.5;
const FIFTH: f64 = 0.2;

/// The feature vector carried by every record: one integer feature followed
/// by seven float features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    /// Uniform in `[0, CATEGORY_BOUND)`.
    pub category: u8,
    /// Uniform in `[0, 1)`, except the fourth and fifth which are scaled by
    /// 0.5 and the sixth and seventh which are scaled by 0.2.
    pub signals: [f64; SIGNALS],
}

impl Distribution<Features> for StandardUniform {
    fn sample<R>(&self, rng: &mut R) -> Features
    where
        R: Rng + ?Sized,
    {
        let category = rng.random_range(0..CATEGORY_BOUND);
        let mut signals: [f64; SIGNALS] = std::array::from_fn(|_| rng.random::<f64>());
        signals[3] *= HALF;
        signals[4] *= HALF;
        signals[5] *= FIFTH;
        signals[6] *= FIFTH;

        Features { category, signals }
    }
}

/// One feature-vector record, ready to be written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Message<'a> {
    /// Identity of the producer that built the record.
    pub emp_id: u32,
    /// The feature vector.
    pub features: Features,
    /// Partition key, `thread_<emp_id>`.
    pub key: &'a str,
}

impl Message<'_> {
    /// Write the record into `writer`, no trailing newline.
    ///
    /// # Errors
    ///
    /// Function will error if `writer` does.
    pub fn to_bytes<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: Write,
    {
        write!(
            writer,
            "{{\"message\": {{\"emp_id\": {emp_id}, \"features\": [{category}",
            emp_id = self.emp_id,
            category = self.features.category,
        )?;
        for signal in &self.features.signals {
            write!(writer, ", {signal:.2}")?;
        }
        write!(writer, "]}}, \"key\": \"{key}\"}}", key = self.key)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Feature-vector payload for a single producer.
///
/// The producer identity is fixed at construction, every record built by this
/// instance carries it as `emp_id` and in its key.
pub struct FeatureLog {
    emp_id: u32,
    key: String,
}

impl FeatureLog {
    /// Construct a new instance of `FeatureLog` for producer `emp_id`.
    #[must_use]
    pub fn new(emp_id: u32) -> Self {
        Self {
            emp_id,
            key: format!("thread_{emp_id}"),
        }
    }

    /// Build a fresh record.
    pub fn generate<R>(&self, rng: &mut R) -> Message<'_>
    where
        R: Rng + ?Sized,
    {
        Message {
            emp_id: self.emp_id,
            features: rng.random(),
            key: &self.key,
        }
    }
}

impl crate::Serialize for FeatureLog {
    fn to_bytes<W, R>(&self, mut rng: R, writer: &mut W) -> Result<(), Error>
    where
        R: Rng + Sized,
        W: Write,
    {
        self.generate(&mut rng).to_bytes(writer)
    }
}
