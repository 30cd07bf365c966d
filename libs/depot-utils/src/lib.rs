#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Small shared helpers for the depot console workspace.

#[cfg(feature = "humantime-serde")]
pub mod humantime_serde;
mod secret_string;

pub use secret_string::SecretString;
