#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP client for the depot console backend.
//!
//! A hyper client behind a tower stack:
//! - rustls with webpki roots (HTTPS only unless
//!   [`TransportSecurity::AllowInsecureHttp`] is chosen)
//! - connection pooling and a per-request timeout
//! - `User-Agent` and `Accept: application/json` defaults
//! - transparent gzip/brotli/deflate decompression, with body limits applied
//!   to the decompressed bytes
//! - a hook for one auth layer ([`HttpClientBuilder::with_auth_layer`]),
//!   used by `depot-auth` to inject bearer tokens and recover from 401s
//!
//! ```ignore
//! use depot_http::HttpClient;
//!
//! let client = HttpClient::builder().build()?;
//! let vendors: serde_json::Value = client
//!     .get("https://console.example.com/api/vendors")
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;

pub use builder::{HttpClientBuilder, InnerService};
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody};
