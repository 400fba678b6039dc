//! # cronprimer-operator
//!
//! Kubernetes operator for `PreScaledCronJob` resources.
//!
//! A `PreScaledCronJob` wraps a batch `CronJob` and a warm-up lead time. The
//! operator maintains a derived `CronJob` that fires that many minutes early
//! and starts with an injected init container which sleeps until the original
//! schedule, so the cluster autoscaler has already added nodes by the time
//! the workload is due. It then measures, from pod events, how long each
//! stage of the start-up took.
//!
//! ## Layout
//!
//! - [`crd`]: the custom resource
//! - [`derived`]: derived `CronJob` generation
//! - [`cluster`]: the boundary to the API server, live and in-memory
//! - [`controllers`]: the synchronizer and pod timing reconcilers
//! - [`config`], [`probes`]: process configuration and health endpoints
//! - [`warmup`]: the injected warm-up step, run by the `cronprimer-warmup`
//!   binary

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod derived;
pub mod error;
pub mod probes;
pub mod warmup;

pub use error::{Error, Result};
