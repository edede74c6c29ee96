//! Core of the health-study table exporter.
//!
//! Decides whether remote table columns can be widened in place ([`schema`]), calls the remote table
//! service with retries and polls its asynchronous jobs ([`remote`]), and buffers export batches as
//! tab separated files ([`tsv`]).

pub mod error;
mod macros;
pub mod remote;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tsv;
