//! Collaborator seams for byte transfer and save targets.
//!
//! The actual wire protocol lives elsewhere; this layer only cares that a
//! download call returns bytes or fails. Timeouts and retries are the
//! transfer collaborator's business, not ours.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opaque addressing record the transfer collaborator needs to locate a
/// resource (or one of its thumbnail variants).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DocumentLocator {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    /// Present when addressing a thumbnail variant instead of the full
    /// resource.
    pub thumb_size: Option<String>,
}

impl std::fmt::Debug for DocumentLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLocator")
            .field("id", &self.id)
            .field("file_reference", &hex::encode(&self.file_reference))
            .field("thumb_size", &self.thumb_size)
            .finish()
    }
}

/// Hint passed to the transfer collaborator so it can route sticker
/// payloads through their dedicated pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Sticker,
}

/// Options for a full-resource download.
#[derive(Clone)]
pub struct FullDownloadOptions {
    pub mime_type: String,
    /// When present, the collaborator streams bytes into this target as
    /// well as returning them.
    pub output: Option<Arc<dyn SaveTarget>>,
    pub kind: ResourceKind,
}

/// Options for a small-variant (thumbnail) download.
#[derive(Debug, Clone)]
pub struct SmallDownloadOptions {
    pub dc_id: i32,
    pub mime_type: String,
    pub kind: ResourceKind,
}

/// The network transfer collaborator.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Download a full resource. Cancellation-safe: dropping the returned
    /// future abandons the transfer.
    async fn download_full(
        &self,
        dc_id: i32,
        locator: DocumentLocator,
        size: i64,
        opts: FullDownloadOptions,
    ) -> Result<Bytes>;

    /// Download a small variant (separate path and budget from full
    /// downloads).
    async fn download_small(
        &self,
        locator: DocumentLocator,
        opts: SmallDownloadOptions,
    ) -> Result<Bytes>;

    /// Bytes the collaborator still holds for this locator, if any.
    fn get_cached(&self, locator: &DocumentLocator) -> Option<Bytes>;

    /// Hand a small variant back to the collaborator's cache.
    fn save_small(&self, locator: &DocumentLocator, bytes: Bytes);
}

/// A user-chosen save destination with scoped acquisition.
#[async_trait]
pub trait SaveTarget: Send + Sync {
    /// Resolves once the target is ready to receive bytes.
    async fn ready(&self) -> Result<()>;

    /// Append a chunk.
    async fn write(&self, bytes: Bytes) -> Result<()>;

    /// Release the target. Must be called exactly once per acquisition.
    async fn close(&self);
}

/// The file-system save-dialog collaborator.
#[async_trait]
pub trait SaveTargetProvider: Send + Sync {
    /// Ask the user/OS for a save destination. Fails if declined.
    async fn choose_save_target(
        &self,
        filename: &str,
        ext: &str,
        mime_type: &str,
        size: i64,
    ) -> Result<Arc<dyn SaveTarget>>;

    /// Fallback: save a fully-buffered payload as a file.
    async fn save_bytes(&self, filename: &str, bytes: Bytes) -> Result<()>;
}
