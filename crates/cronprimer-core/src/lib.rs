//! # cronprimer-core
//!
//! Domain logic for the cronprimer operator, free of any cluster client.
//!
//! The operator lets users declare a batch schedule together with a warm-up
//! lead time. A derived schedule fires that many minutes earlier and runs an
//! injected warm-up step first, so compute capacity is already provisioned
//! when the real workload is due.
//!
//! This crate provides:
//!
//! - **Schedule shifting** ([`schedule`]): computes the earlier schedule or
//!   explains why an expression cannot be shifted.
//! - **Fingerprints** ([`fingerprint`]): content hashes of generated objects
//!   used to skip writes that would change nothing.
//! - **Lifecycle timing** ([`lifecycle`]): turns a workload instance's event
//!   history into stage durations, reporting each transition once using a
//!   [`high_water`] mark per instance.
//! - **Ambient plumbing**: [`metrics`] names and recorders, [`observability`]
//!   logging setup and [`error`] types.
//!
//! ## Example
//!
//! ```rust
//! use cronprimer_core::schedule::primer_schedule;
//!
//! let shifted = primer_schedule("0 0 * * *", 10, None).unwrap();
//! assert_eq!(shifted, "50 23 * * *");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod canonical_json;
pub mod error;
pub mod fingerprint;
pub mod high_water;
pub mod lifecycle;
pub mod metrics;
pub mod observability;
pub mod schedule;

pub use error::{Error, Result};
