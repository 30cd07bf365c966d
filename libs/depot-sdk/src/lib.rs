#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Typed client for the depot console REST API.
//!
//! ```ignore
//! use depot_sdk::{ConsoleClient, ListQuery, ResourceKind};
//!
//! let client = ConsoleClient::builder(base_url).token_store(store).build()?;
//! client.login("ops@depot.example", &password).await?;
//! let vendors = client
//!     .resource(ResourceKind::Vendors)
//!     .list::<serde_json::Value>(&ListQuery::new().limit(20))
//!     .await?;
//! ```

pub mod client;
pub mod envelope;
pub mod error;
pub mod resource;

pub use client::{ConsoleClient, ConsoleClientBuilder};
pub use envelope::{ApiEnvelope, Page, Pagination};
pub use error::ApiError;
pub use resource::{ListQuery, Resource, ResourceKind};

pub use depot_auth::{SessionExpired, TokenStore, UserProfile};
