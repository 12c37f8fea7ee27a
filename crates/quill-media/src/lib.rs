//! # quill-media
//!
//! The document registry and resource cache: heterogeneous media
//! attribute lists are normalized into canonical [`document::Document`]
//! descriptors, and [`cache::ResourceCache`] orchestrates deduplicated
//! downloads of full resources and thumbnails through an injected
//! transfer collaborator.

pub mod cache;
pub mod document;
pub mod registry;
pub mod transfer;

mod error;

pub use cache::ResourceCache;
pub use document::{Document, DocumentAttribute, DocumentType, RawDocument, Thumbnail};
pub use error::{MediaError, Result};
pub use registry::{DocumentExtras, DocumentRegistry};
pub use transfer::{
    DocumentLocator, FullDownloadOptions, ResourceKind, SaveTarget, SaveTargetProvider,
    SmallDownloadOptions, TransferClient,
};
