#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Session authentication for the depot console client.
//!
//! Installs into a [`depot_http::HttpClient`] through
//! [`HttpClientBuilderExt::with_session_auth`]:
//!
//! - every request carries `Authorization: Bearer <access token>` read from
//!   the [`TokenStore`]
//! - a 401 triggers one refresh exchange per cycle, shared by every request
//!   that fails while it runs; each of them is then replayed once with the new
//!   token
//! - a failed refresh clears the store and calls the
//!   [`SessionExpiredHandler`] once; waiting requests fail with
//!   [`depot_http::HttpError::SessionExpired`]

// Core modules
pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Refresh flow
pub mod builder_ext;
pub mod coordinator;
pub mod exchange;
pub mod expiry;
pub mod http_error;
pub mod layer;

pub use builder_ext::HttpClientBuilderExt;
pub use config::{SessionConfig, join_api_path};
pub use coordinator::{Recovery, RefreshCoordinator};
pub use error::{ConfigError, RefreshError, StoreError};
pub use exchange::{HttpRefreshExchange, RefreshExchange};
pub use expiry::{BroadcastExpiryHandler, LogExpiryHandler, SessionExpired, SessionExpiredHandler};
pub use http_error::describe_http_error;
pub use layer::{Attempt, SessionAuthLayer, SessionAuthService};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{TokenPair, UserProfile, WireTokenPair};

pub use depot_utils::SecretString;
