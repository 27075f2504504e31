//! FrameSourceRegistry - Camera Sources and Live Switching
//!
//! ## Responsibilities
//!
//! - Ordered registry of named camera sources
//! - Exactly one active connection at a time (none when stopped)
//! - Hot switching: open the new source, commit, then release the old one
//! - Frame readers pinned to the source they started on
//!
//! A frame read from a retired source is discarded: the capture loop only
//! processes a frame while holding a [`FrameLease`] for the reader's
//! generation, and switching waits for outstanding leases before committing.

mod http_snapshot;
mod types;

pub use http_snapshot::HttpSnapshotConnector;
pub use types::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

/// An open camera connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next decoded frame. May block up to the source's own timeout.
    async fn next_frame(&mut self) -> std::result::Result<Frame, FrameError>;

    /// Release the underlying connection
    async fn close(&mut self);
}

/// Opens camera connections from a locator
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Errors are reported as [`Error::SourceConnect`]
    async fn connect(&self, source: &CameraSource) -> Result<Box<dyn FrameStream>>;
}

struct StreamCell {
    stream: Box<dyn FrameStream>,
    closed: bool,
}

type SharedStream = Arc<Mutex<StreamCell>>;

struct ActiveSlot {
    camera_id: String,
    generation: u64,
    stream: SharedStream,
}

/// Reader bound to the source that was active when it was handed out
pub struct ActiveFrameReader {
    camera_id: String,
    generation: u64,
    stream: SharedStream,
}

impl ActiveFrameReader {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read the next frame from this reader's source
    pub async fn next_frame(&self) -> std::result::Result<Frame, FrameError> {
        let mut cell = self.stream.lock().await;
        if cell.closed {
            return Err(FrameError::Retired);
        }
        cell.stream.next_frame().await
    }
}

/// Proof that a reader's generation is still the active one
///
/// Switching blocks until every lease is dropped.
pub struct FrameLease<'a> {
    _guard: RwLockReadGuard<'a, Option<ActiveSlot>>,
}

/// FrameSourceRegistry instance
pub struct FrameSourceRegistry {
    connector: Arc<dyn SourceConnector>,
    sources: RwLock<Vec<CameraSource>>,
    selected: RwLock<Option<String>>,
    active: RwLock<Option<ActiveSlot>>,
    next_generation: AtomicU64,
}

impl FrameSourceRegistry {
    /// Create new registry
    pub fn new(connector: Arc<dyn SourceConnector>) -> Self {
        Self {
            connector,
            sources: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
            active: RwLock::new(None),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Register a camera source. The first registered source becomes the
    /// selected one.
    pub async fn register(&self, source: CameraSource) -> Result<()> {
        if source.id.trim().is_empty() {
            return Err(Error::Validation("camera id must not be empty".to_string()));
        }
        if source.locator.trim().is_empty() {
            return Err(Error::Validation(format!(
                "camera {} has an empty url",
                source.id
            )));
        }

        let mut sources = self.sources.write().await;
        if sources.iter().any(|s| s.id == source.id) {
            return Err(Error::Conflict(format!(
                "camera {} already registered",
                source.id
            )));
        }

        tracing::info!(
            camera_id = %source.id,
            name = %source.display_name,
            "Camera source registered"
        );

        let id = source.id.clone();
        sources.push(CameraSource {
            is_active: false,
            ..source
        });
        drop(sources);

        let mut selected = self.selected.write().await;
        if selected.is_none() {
            *selected = Some(id);
        }
        Ok(())
    }

    /// Remove a camera source. The active source cannot be removed.
    ///
    /// The active slot stays locked until the source is gone, so a switch
    /// cannot commit to it in between.
    pub async fn remove(&self, camera_id: &str) -> Result<CameraSource> {
        let active = self.active.read().await;
        if active.as_ref().map(|slot| slot.camera_id.as_str()) == Some(camera_id) {
            return Err(Error::Conflict(format!(
                "camera {} is active; switch away before removing it",
                camera_id
            )));
        }

        let removed = {
            let mut sources = self.sources.write().await;
            let index = sources
                .iter()
                .position(|s| s.id == camera_id)
                .ok_or_else(|| Error::NotFound(format!("camera {}", camera_id)))?;
            sources.remove(index)
        };
        drop(active);

        let mut selected = self.selected.write().await;
        if selected.as_deref() == Some(camera_id) {
            *selected = self.sources.read().await.first().map(|s| s.id.clone());
        }

        tracing::info!(camera_id = %camera_id, "Camera source removed");
        Ok(removed)
    }

    /// All sources in registration order
    pub async fn list_sources(&self) -> Vec<CameraSource> {
        let active_id = self.active_camera_id().await;
        self.sources
            .read()
            .await
            .iter()
            .map(|s| CameraSource {
                is_active: active_id.as_deref() == Some(s.id.as_str()),
                ..s.clone()
            })
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraSource> {
        self.sources
            .read()
            .await
            .iter()
            .find(|s| s.id == camera_id)
            .cloned()
    }

    /// Choose the source to open on the next start, without connecting
    pub async fn select(&self, camera_id: &str) -> Result<CameraSource> {
        let source = self
            .get(camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("camera {}", camera_id)))?;
        *self.selected.write().await = Some(camera_id.to_string());
        tracing::info!(camera_id = %camera_id, "Camera source selected");
        Ok(source)
    }

    pub async fn selected_id(&self) -> Option<String> {
        self.selected.read().await.clone()
    }

    pub async fn active_camera_id(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|slot| slot.camera_id.clone())
    }

    /// Switch the active source
    ///
    /// The new source is opened first. On failure the previous source stays
    /// active. On success the switch commits once in-flight frame processing
    /// has finished, and the old connection is closed after its in-flight
    /// read completes.
    pub async fn switch_to(&self, camera_id: &str) -> Result<CameraSource> {
        let source = self
            .get(camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("camera {}", camera_id)))?;

        let stream = self.open(&source).await?;

        let previous = {
            let mut active = self.active.write().await;
            if !self.contains(&source.id).await {
                drop(active);
                Self::close_stream(stream, &source.id).await;
                return Err(Error::NotFound(format!("camera {}", camera_id)));
            }
            let slot = self.new_slot(&source.id, stream);
            active.replace(slot)
        };
        *self.selected.write().await = Some(source.id.clone());

        if let Some(old) = previous {
            Self::retire(old).await;
        }

        tracing::info!(camera_id = %source.id, "Switched active camera source");
        Ok(CameraSource {
            is_active: true,
            ..source
        })
    }

    /// Open the selected source if nothing is active
    pub async fn activate_selected(&self) -> Result<CameraSource> {
        let camera_id = match self.selected_id().await {
            Some(id) => id,
            None => self
                .sources
                .read()
                .await
                .first()
                .map(|s| s.id.clone())
                .ok_or_else(|| Error::NotFound("no camera sources registered".to_string()))?,
        };

        let source = self
            .get(&camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("camera {}", camera_id)))?;
        let stream = self.open(&source).await?;

        let mut active = self.active.write().await;
        if let Some(current) = active.as_ref().map(|slot| slot.camera_id.clone()) {
            // Someone else activated a source while we were connecting
            drop(active);
            Self::close_stream(stream, &source.id).await;
            return self
                .get(&current)
                .await
                .map(|s| CameraSource {
                    is_active: true,
                    ..s
                })
                .ok_or_else(|| Error::NotFound(format!("camera {}", current)));
        }
        if !self.contains(&source.id).await {
            drop(active);
            Self::close_stream(stream, &source.id).await;
            return Err(Error::NotFound(format!("camera {}", source.id)));
        }
        *active = Some(self.new_slot(&source.id, stream));
        drop(active);

        tracing::info!(camera_id = %source.id, "Camera source activated");
        Ok(CameraSource {
            is_active: true,
            ..source
        })
    }

    /// Reopen the active source after read failures
    ///
    /// Only applies if `generation` is still active; a switch that happened
    /// in the meantime wins and the fresh connection is discarded.
    pub async fn reconnect_active(&self, generation: u64) -> Result<()> {
        let camera_id = {
            let active = self.active.read().await;
            match active.as_ref() {
                Some(slot) if slot.generation == generation => slot.camera_id.clone(),
                _ => return Ok(()),
            }
        };
        let source = self
            .get(&camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("camera {}", camera_id)))?;

        let stream = self.open(&source).await?;

        let previous = {
            let mut active = self.active.write().await;
            let still_current =
                matches!(active.as_ref(), Some(slot) if slot.generation == generation);
            if !still_current {
                drop(active);
                Self::close_stream(stream, &camera_id).await;
                return Ok(());
            }
            let slot = self.new_slot(&camera_id, stream);
            active.replace(slot)
        };

        if let Some(old) = previous {
            Self::retire(old).await;
        }
        tracing::info!(camera_id = %camera_id, "Camera source reconnected");
        Ok(())
    }

    /// Release the active source. Returns the released camera id.
    pub async fn deactivate(&self) -> Option<String> {
        let previous = self.active.write().await.take();
        match previous {
            Some(slot) => {
                let camera_id = slot.camera_id.clone();
                Self::retire(slot).await;
                Some(camera_id)
            }
            None => None,
        }
    }

    /// Reader for the currently active source
    pub async fn active_frame_reader(&self) -> Option<ActiveFrameReader> {
        self.active.read().await.as_ref().map(|slot| ActiveFrameReader {
            camera_id: slot.camera_id.clone(),
            generation: slot.generation,
            stream: slot.stream.clone(),
        })
    }

    /// Lease for processing a frame read at `generation`
    ///
    /// Returns `None` if the source was switched since the read started.
    pub async fn begin_processing(&self, generation: u64) -> Option<FrameLease<'_>> {
        let guard = self.active.read().await;
        match guard.as_ref() {
            Some(slot) if slot.generation == generation => Some(FrameLease { _guard: guard }),
            _ => None,
        }
    }

    async fn open(&self, source: &CameraSource) -> Result<Box<dyn FrameStream>> {
        match self.connector.connect(source).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                tracing::warn!(camera_id = %source.id, error = %e, "Camera source connect failed");
                Err(match e {
                    e @ Error::SourceConnect { .. } => e,
                    other => Error::SourceConnect {
                        camera_id: source.id.clone(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    async fn contains(&self, camera_id: &str) -> bool {
        self.sources.read().await.iter().any(|s| s.id == camera_id)
    }

    fn new_slot(&self, camera_id: &str, stream: Box<dyn FrameStream>) -> ActiveSlot {
        ActiveSlot {
            camera_id: camera_id.to_string(),
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
            stream: Arc::new(Mutex::new(StreamCell {
                stream,
                closed: false,
            })),
        }
    }

    /// Close a retired slot once its in-flight read (if any) is done
    async fn retire(slot: ActiveSlot) {
        let mut cell = slot.stream.lock().await;
        if !cell.closed {
            cell.stream.close().await;
            cell.closed = true;
        }
        tracing::info!(
            camera_id = %slot.camera_id,
            generation = slot.generation,
            "Camera source released"
        );
    }

    async fn close_stream(mut stream: Box<dyn FrameStream>, camera_id: &str) {
        stream.close().await;
        tracing::debug!(camera_id = %camera_id, "Discarded redundant connection");
    }
}
