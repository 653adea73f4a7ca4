//! Photobooth share service
//!
//! Backend for a kiosk photobooth: the browser UI captures photos and hands
//! them to this service, which keeps them for a short while under an
//! unguessable link that the UI shows as a URL or QR code.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server serving the kiosk UI and the share API
//! - **Session Store**: in-memory, TTL-bound store of captured photos
//! - **Share codes**: QR rendering of download links
//!
//! # Modules
//!
//! - [`session`]: session store, ids, clock and image validation
//! - [`api`]: HTTP handlers and download pages
//! - [`config`]: layered configuration
//! - [`error`]: error taxonomy and HTTP mapping

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod error;
pub mod security;
pub mod server;
pub mod session;
pub mod telemetry;

use crate::config::AppConfig;
use crate::security::rate_limit::SimpleRateLimiter;

use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Download session store.
    pub sessions: SessionStore,
    /// Global Rate Limiter
    pub rate_limiter: Arc<SimpleRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
