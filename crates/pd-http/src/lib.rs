//! HTTP backend for Pointdown.
//!
//! [`HttpBackend`] speaks the issue tracker's REST API (Jira Cloud v3
//! layout). It implements both seams the core needs:
//!
//! - [`pd_store::PropertyStore`] over the entity-property endpoints, with
//!   bulk conditional writes and deferred task polling
//! - [`pd_commit::FieldService`] over the issue resource, for the numeric
//!   field being edited
//!
//! The `reqwest::Client` is passed in (or built once by
//! [`HttpBackend::new`]) and shared by every request the backend makes.

pub mod backend;
pub mod config;
pub mod error;
mod fields;
mod properties;

#[cfg(test)]
mod fake;

pub use backend::HttpBackend;
pub use config::{RemoteConfig, DEFAULT_FIELD_ID};
pub use error::{HttpError, HttpResult};
