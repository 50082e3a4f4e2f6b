//! The clientsim synthetic load generator.
//!
//! This library supports the clientsim binary found elsewhere in this project.
//! A fixed pool of producers posts randomly built feature-vector records to an
//! HTTP endpoint until the process is interrupted.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod interrupt;
pub mod orchestrator;
pub mod producer;

#[cfg(test)]
mod stub;
