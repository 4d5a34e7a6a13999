//! Review store: in-memory map keyed by review id, mirrored to one JSON file.
//!
//! Every mutation rewrites the whole mirror through a `.tmp` sibling and an
//! atomic rename, so the canonical file always holds a complete snapshot.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::review::Review;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to unmarshal reviews from {}: {source}", .path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to marshal reviews: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to persist reviews to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct ReviewStore {
    path: PathBuf,
    reviews: RwLock<HashMap<String, Review>>,
}

impl ReviewStore {
    /// Create an empty store mirrored at `path`, creating its directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        Ok(Self {
            path,
            reviews: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace every review by id, then persist the full map.
    ///
    /// On a persist error the in-memory map keeps the new reviews; the file
    /// catches up on the next successful write.
    pub fn upsert(&self, batch: Vec<Review>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut reviews = self.write();
        for review in batch {
            reviews.insert(review.id.clone(), review);
        }
        self.persist(&reviews)
    }

    /// Replace the in-memory map with the mirror file's contents.
    ///
    /// A missing file leaves the store as it is. A file that cannot be read
    /// or parsed is an error and the map is not touched.
    pub fn load_from_disk(&self) -> Result<(), StoreError> {
        let mut reviews = self.write();

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No review file yet, starting empty");
                return Ok(());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let loaded: Vec<Review> =
            serde_json::from_str(&content).map_err(|source| StoreError::CorruptState {
                path: self.path.clone(),
                source,
            })?;

        *reviews = loaded
            .into_iter()
            .map(|review| (review.id.clone(), review))
            .collect();

        info!(count = reviews.len(), path = %self.path.display(), "Loaded reviews from disk");
        Ok(())
    }

    /// Write the current map to disk now (shutdown path).
    pub fn persist_now(&self) -> Result<(), StoreError> {
        let reviews = self.write();
        self.persist(&reviews)
    }

    /// Snapshot of every stored review, in no particular order.
    pub fn all_reviews(&self) -> Vec<Review> {
        self.read().values().cloned().collect()
    }

    /// Reviews of `app_id` submitted no more than `window` before now.
    pub fn reviews_since(&self, app_id: &str, window: Duration) -> Vec<Review> {
        self.reviews_since_at(app_id, window, Utc::now())
    }

    /// Same as [`reviews_since`](Self::reviews_since) against an explicit clock.
    /// Reviews dated after `now` are kept.
    pub fn reviews_since_at(
        &self,
        app_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Vec<Review> {
        self.read()
            .values()
            .filter(|r| r.app_id == app_id && now - r.submitted_at <= window)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Caller holds the write lock, so file writes are serialized with mutations.
    fn persist(&self, reviews: &HashMap<String, Review>) -> Result<(), StoreError> {
        let mut snapshot: Vec<&Review> = reviews.values().collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        let content = serde_json::to_string_pretty(&snapshot)?;

        let tmp_path = self.tmp_path();
        let written = fs::write(&tmp_path, content).and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(source) = written {
            // Best effort; the canonical file was never touched.
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Persist {
                path: self.path.clone(),
                source,
            });
        }

        debug!(count = snapshot.len(), path = %self.path.display(), "Reviews persisted");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Review>> {
        self.reviews.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Review>> {
        self.reviews.write().unwrap_or_else(PoisonError::into_inner)
    }
}
