//! In-memory store of short-lived download sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use super::clock::{Clock, SystemClock};
use super::image::{ImageRejection, StoredImage, decode_payload};
use super::token;
use crate::error::SessionError;

/// Path segment under which sessions are served.
pub const DOWNLOAD_PATH_PREFIX: &str = "s";

/// Limits and addressing the store is constructed with.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Lifetime of a session from creation.
    pub ttl: Duration,
    /// Maximum images per session.
    pub max_images: usize,
    /// Maximum decoded size of a single image.
    pub max_image_bytes: usize,
    /// Cap on concurrently stored sessions; `None` means unbounded.
    pub max_live_sessions: Option<usize>,
    /// Base address download links are built from. Must end in `/`.
    pub public_base_url: Url,
}

/// A stored download session.
///
/// Cheap to clone; all clones share one immutable snapshot, so a reader
/// keeps its images even if the store purges the entry meanwhile.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    images: Vec<StoredImage>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    publish_requested: bool,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Images in the order they were supplied.
    #[must_use]
    pub fn images(&self) -> &[StoredImage] {
        &self.inner.images
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.inner.expires_at
    }

    /// Caller-supplied publish intent, stored as given.
    #[must_use]
    pub fn publish_requested(&self) -> bool {
        self.inner.publish_requested
    }

    /// A session is live strictly before its expiry instant.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.inner.expires_at
    }
}

/// What `create` hands back to the caller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    /// Absolute retrieval URL embedding the id.
    pub download_url: Url,
    pub expires_at: DateTime<Utc>,
    pub publish_requested: bool,
}

/// Thread-safe store for download sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    settings: StoreSettings,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store driven by the wall clock.
    #[must_use]
    pub fn new(settings: StoreSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a store driven by the given clock.
    #[must_use]
    pub fn with_clock(settings: StoreSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                settings,
                clock,
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &StoreSettings {
        &self.inner.settings
    }

    /// Validate `images` and store them as a new session.
    ///
    /// Either every image is accepted and a session is created, or nothing
    /// is stored. Decoding is CPU-bound; async callers should run this on
    /// the blocking pool.
    pub fn create<S: AsRef<str>>(
        &self,
        images: &[S],
        publish_requested: bool,
    ) -> Result<SessionHandle, SessionError> {
        let settings = &self.inner.settings;

        if images.is_empty() {
            return Err(SessionError::NoImages);
        }
        if images.len() > settings.max_images {
            return Err(SessionError::TooManyImages {
                count: images.len(),
                max: settings.max_images,
            });
        }

        let mut decoded = Vec::with_capacity(images.len());
        let mut rejections: Vec<ImageRejection> = Vec::new();
        for (index, raw) in images.iter().enumerate() {
            match decode_payload(index, raw.as_ref(), settings.max_image_bytes) {
                Ok(img) => decoded.push(img),
                Err(rejection) => rejections.push(rejection),
            }
        }
        if !rejections.is_empty() {
            return Err(SessionError::InvalidImages(rejections));
        }

        let ttl = chrono::Duration::from_std(settings.ttl)
            .map_err(|e| SessionError::Internal(format!("ttl out of range: {e}")))?;

        let mut guard = self.inner.sessions.write().unwrap();
        let now = self.inner.clock.now();

        if let Some(limit) = settings.max_live_sessions {
            if guard.len() >= limit {
                guard.retain(|_, s| s.is_live_at(now));
            }
            if guard.len() >= limit {
                return Err(SessionError::CapacityExceeded { limit });
            }
        }

        let mut id = token::generate_id();
        while guard.contains_key(&id) {
            id = token::generate_id();
        }

        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| SessionError::Internal("expiry overflows the calendar".into()))?;
        let download_url = self.download_url(&id)?;

        let session = Session {
            inner: Arc::new(SessionInner {
                id: id.clone(),
                images: decoded,
                created_at: now,
                expires_at,
                publish_requested,
            }),
        };
        guard.insert(id.clone(), session);
        let live = guard.len();
        drop(guard);

        info!(
            name: "session.created",
            images = images.len(),
            publish = publish_requested,
            expires_at = %expires_at,
            live_sessions = live,
            "Download session created"
        );

        Ok(SessionHandle {
            id,
            download_url,
            expires_at,
            publish_requested,
        })
    }

    /// Look up a live session by id.
    ///
    /// Unknown and expired ids both yield [`SessionError::NotFound`]. An
    /// expired entry found here is purged.
    pub fn retrieve(&self, id: &str) -> Result<Session, SessionError> {
        if !token::is_well_formed(id) {
            return Err(SessionError::NotFound);
        }

        let now = self.inner.clock.now();
        let found = self.inner.sessions.read().unwrap().get(id).cloned();
        match found {
            Some(session) if session.is_live_at(now) => Ok(session),
            Some(_) => {
                self.purge_if_expired(id);
                Err(SessionError::NotFound)
            }
            None => Err(SessionError::NotFound),
        }
    }

    /// Fetch one image of a live session. The bytes are shared, not copied.
    pub fn image(&self, id: &str, index: usize) -> Result<StoredImage, SessionError> {
        self.retrieve(id)?
            .images()
            .get(index)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut guard = self.inner.sessions.write().unwrap();
        let now = self.inner.clock.now();
        let before = guard.len();
        guard.retain(|_, s| s.is_live_at(now));
        let removed = before - guard.len();
        drop(guard);

        if removed > 0 {
            info!(name: "session.swept", removed, "Expired sessions purged");
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `every` until the task is aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                debug!(name: "session.sweep", removed, remaining = store.len(), "Sweep finished");
            }
        })
    }

    /// Number of stored sessions, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute download URL for `id`.
    pub fn download_url(&self, id: &str) -> Result<Url, SessionError> {
        self.inner
            .settings
            .public_base_url
            .join(&format!("{DOWNLOAD_PATH_PREFIX}/{id}"))
            .map_err(|e| SessionError::Internal(format!("cannot build download URL: {e}")))
    }

    fn purge_if_expired(&self, id: &str) {
        let mut guard = self.inner.sessions.write().unwrap();
        let now = self.inner.clock.now();
        // Re-check under the write lock; the entry may have been replaced.
        if guard.get(id).is_some_and(|s| !s.is_live_at(now)) {
            guard.remove(id);
            debug!(name: "session.purged", "Expired session purged on access");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::clock::ManualClock;
    use crate::session::image::tests::{as_data_url, sample_image};
    use image::ImageFormat;

    fn settings(ttl_secs: u64) -> StoreSettings {
        StoreSettings {
            ttl: Duration::from_secs(ttl_secs),
            max_images: 3,
            max_image_bytes: 1 << 20,
            max_live_sessions: None,
            public_base_url: Url::parse("http://booth.local:5001/").unwrap(),
        }
    }

    fn store(ttl_secs: u64) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = SessionStore::with_clock(settings(ttl_secs), Arc::clone(&clock) as Arc<dyn Clock>);
        (store, clock)
    }

    fn png(shade: u8) -> String {
        as_data_url(&sample_image(ImageFormat::Png, shade), "image/png")
    }

    #[test]
    fn test_create_then_retrieve_preserves_order_and_bytes() {
        let (store, _clock) = store(60);
        for count in 1..=3u8 {
            let payloads: Vec<Vec<u8>> = (0..count)
                .map(|i| sample_image(ImageFormat::Png, i * 40))
                .collect();
            let urls: Vec<String> = payloads
                .iter()
                .map(|p| as_data_url(p, "image/png"))
                .collect();

            let handle = store.create(&urls, false).unwrap();
            let session = store.retrieve(&handle.id).unwrap();

            let stored: Vec<&[u8]> = session.images().iter().map(StoredImage::bytes).collect();
            let expected: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
            assert_eq!(stored, expected);
        }
    }

    #[test]
    fn test_handle_carries_absolute_download_url() {
        let (store, _clock) = store(60);
        let handle = store.create(&[png(1)], true).unwrap();

        assert_eq!(
            handle.download_url.as_str(),
            format!("http://booth.local:5001/s/{}", handle.id)
        );
        assert!(handle.publish_requested);
        assert!(store.retrieve(&handle.id).unwrap().publish_requested());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (store, _clock) = store(60);
        let err = store.retrieve(&token::generate_id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.retrieve("../etc/passwd").is_err());
    }

    #[test]
    fn test_expiry_timeline() {
        let (store, clock) = store(2);
        let handle = store.create(&[png(7)], false).unwrap();

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.retrieve(&handle.id).unwrap().images().len(), 1);

        clock.advance(Duration::from_secs(2));
        assert!(matches!(
            store.retrieve(&handle.id),
            Err(SessionError::NotFound)
        ));
        // Lazily purged on access.
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_is_gone_exactly_at_expiry() {
        let (store, clock) = store(10);
        let handle = store.create(&[png(7)], false).unwrap();

        clock.advance(Duration::from_secs(10));
        assert!(store.retrieve(&handle.id).is_err());
    }

    #[test]
    fn test_rejects_empty_and_oversized_sets() {
        let (store, _clock) = store(60);
        let none: [String; 0] = [];

        let err = store.create(&none, false).unwrap_err();
        assert!(matches!(err, SessionError::NoImages));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let four = vec![png(1), png(2), png(3), png(4)];
        let err = store.create(&four, false).unwrap_err();
        assert!(matches!(
            err,
            SessionError::TooManyImages { count: 4, max: 3 }
        ));

        assert_eq!(store.sweep(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_one_bad_image_rejects_whole_request() {
        let (store, _clock) = store(60);
        let images = vec![png(1), "garbage".to_string(), png(3)];

        let err = store.create(&images, false).unwrap_err();
        match err {
            SessionError::InvalidImages(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].index, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, clock) = store(10);
        let old = store.create(&[png(1)], false).unwrap();
        clock.advance(Duration::from_secs(6));
        let fresh = store.create(&[png(2)], false).unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.retrieve(&old.id).is_err());
        assert!(store.retrieve(&fresh.id).is_ok());
    }

    #[test]
    fn test_snapshot_survives_sweep() {
        let (store, clock) = store(5);
        let handle = store.create(&[png(9)], false).unwrap();
        let snapshot = store.retrieve(&handle.id).unwrap();

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.sweep(), 1);

        assert_eq!(snapshot.images().len(), 1);
        assert!(!snapshot.images()[0].is_empty());
    }

    #[test]
    fn test_capacity_limit_applies_backpressure() {
        let clock = Arc::new(ManualClock::at_epoch());
        let mut cfg = settings(10);
        cfg.max_live_sessions = Some(2);
        let store = SessionStore::with_clock(cfg, Arc::clone(&clock) as Arc<dyn Clock>);

        store.create(&[png(1)], false).unwrap();
        store.create(&[png(2)], false).unwrap();
        let err = store.create(&[png(3)], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);

        // Expired entries make room again.
        clock.advance(Duration::from_secs(11));
        assert!(store.create(&[png(3)], false).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_image_index_out_of_range() {
        let (store, _clock) = store(60);
        let handle = store.create(&[png(1), png(2)], false).unwrap();

        assert!(store.image(&handle.id, 1).is_ok());
        assert!(matches!(
            store.image(&handle.id, 2),
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_image_download_shares_stored_bytes() {
        let (store, _clock) = store(60);
        let handle = store.create(&[png(1)], false).unwrap();
        let session = store.retrieve(&handle.id).unwrap();

        let served = store.image(&handle.id, 0).unwrap().into_bytes();
        assert_eq!(served.as_ptr(), session.images()[0].bytes().as_ptr());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_purges() {
        let (store, clock) = store(1);
        store.create(&[png(1)], false).unwrap();
        let sweeper = store.spawn_sweeper(Duration::from_secs(5));

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(store.is_empty());
        sweeper.abort();
    }
}
