//! Admission control for crew registrations on journey legs.
//!
//! The [`workflows::registration`] module owns the join pipeline: requirement catalog access,
//! eligibility pre-checks, answer validation, the registration lifecycle, and the deferred
//! assessment trigger.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
