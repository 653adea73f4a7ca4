//! Ephemeral download sessions.
//!
//! A session holds the photos of one capture run under an unguessable id
//! for a fixed time-to-live, after which it is indistinguishable from an id
//! that was never issued.
//!
//! # Architecture
//!
//! - [`SessionStore`]: thread-safe store, creation, retrieval and sweeping
//! - [`Session`]: immutable snapshot of one session's images
//! - [`Clock`]: time source used for every expiry decision
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use photobooth_share::session::{ManualClock, SessionStore, StoreSettings};
//!
//! let clock = Arc::new(ManualClock::at_epoch());
//! let store = SessionStore::with_clock(
//!     StoreSettings {
//!         ttl: Duration::from_secs(60),
//!         max_images: 3,
//!         max_image_bytes: 1 << 20,
//!         max_live_sessions: None,
//!         public_base_url: "http://localhost:5001/".parse().unwrap(),
//!     },
//!     clock.clone(),
//! );
//!
//! let none: [&str; 0] = [];
//! assert!(store.create(&none, false).is_err());
//! assert!(store.is_empty());
//! ```

pub mod clock;
pub mod image;
mod store;
pub mod token;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::image::{ImageRejection, StoredImage};
pub use self::store::{DOWNLOAD_PATH_PREFIX, Session, SessionHandle, SessionStore, StoreSettings};
