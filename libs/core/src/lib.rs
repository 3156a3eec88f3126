//! Shared runtime plumbing for cellar binaries.

pub mod telemetry;
