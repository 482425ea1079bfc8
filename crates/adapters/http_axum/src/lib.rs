//! # gree-amber-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a small **JSON API** over the hub's registry
//!   (`/api/entities`, `/api/devices`)
//! - Forward **entity service calls**
//!   (`POST /api/entities/{id}/services/{service}`) to the integration
//! - Map [`HubError`](gree_amber_domain::error::HubError)s to HTTP status codes
//!
//! ## Dependency rule
//! Depends on `gree-amber-app` (port traits, registry) and `gree-amber-domain`
//! (types used in request/response mapping). Never leaks axum types into the
//! domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;
