//! HTTP API handlers.

pub mod cleanup;
pub mod upload;
pub mod view;

use std::time::Duration;

/// Deadline applied to each upload/view request's backend work.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Deadline applied to a full cleanup sweep.
pub const SWEEP_DEADLINE: Duration = Duration::from_secs(60);
