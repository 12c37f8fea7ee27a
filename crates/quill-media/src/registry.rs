//! Document registry.
//!
//! Process-lifetime table of canonical descriptors, keyed by document id.
//! Re-saving a known identity merges rather than replaces, so richer
//! metadata accumulates across sightings while cache state survives.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::document::{extension_for_mime, Document, RawDocument};
use crate::transfer::DocumentLocator;

/// Extra caller-supplied fields overlaid onto a descriptor when saving,
/// both on first insert and on merge.
#[derive(Debug, Clone, Default)]
pub struct DocumentExtras {
    pub file_name: Option<String>,
    pub local_path: Option<String>,
    pub downloaded: Option<bool>,
}

impl DocumentExtras {
    fn apply(&self, doc: &mut Document) {
        if let Some(name) = &self.file_name {
            doc.file_name = Some(name.clone());
        }
        if let Some(path) = &self.local_path {
            doc.local_path = Some(path.clone());
        }
        if let Some(downloaded) = self.downloaded {
            doc.downloaded = downloaded;
        }
    }
}

/// Canonical in-memory table of media-document descriptors.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    docs: Mutex<HashMap<i64, Document>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and store a raw descriptor, merging with any existing
    /// record for the same identity. Returns the stored (merged) result.
    pub fn save(&self, raw: RawDocument, extras: Option<DocumentExtras>) -> Document {
        let incoming = Document::from_raw(raw);
        let mut docs = self.lock();
        let doc = match docs.entry(incoming.id) {
            Entry::Occupied(entry) => {
                let doc = entry.into_mut();
                doc.merge(incoming);
                doc
            }
            Entry::Vacant(entry) => {
                debug!(doc_id = incoming.id, doc_type = ?incoming.doc_type, "new document");
                entry.insert(incoming)
            }
        };
        if let Some(extras) = extras {
            extras.apply(doc);
        }
        doc.clone()
    }

    /// Look up a descriptor. Unknown identities yield `None`, never an
    /// error.
    pub fn get(&self, id: i64) -> Option<Document> {
        self.lock().get(&id).cloned()
    }

    /// Build the addressing record the transfer collaborator needs.
    pub fn locator(&self, doc: &Document, thumb_size: Option<&str>) -> DocumentLocator {
        DocumentLocator {
            id: doc.id,
            access_hash: doc.access_hash,
            file_reference: doc.file_reference.clone(),
            thumb_size: thumb_size.map(str::to_string),
        }
    }

    /// The filename to present for this document: the explicit one if
    /// set, otherwise a synthesized `t_<type><id><ext>` name.
    pub fn display_filename(&self, doc: &Document) -> String {
        if let Some(name) = &doc.file_name {
            return name.clone();
        }
        let kind = doc.doc_type.map(|t| t.as_str()).unwrap_or("file");
        format!(
            "t_{}{}{}",
            kind,
            doc.id,
            extension_for_mime(&doc.mime_type)
        )
    }

    /// Record a completed full download.
    pub fn mark_downloaded(&self, id: i64) {
        if let Some(doc) = self.lock().get_mut(&id) {
            doc.downloaded = true;
        }
    }

    /// Record the resolved local copy of a downloaded document.
    pub fn set_local_path(&self, id: i64, path: String) {
        if let Some(doc) = self.lock().get_mut(&id) {
            doc.local_path = Some(path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, Document>> {
        self.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentAttribute, Thumbnail};

    fn raw(id: i64) -> RawDocument {
        RawDocument {
            id,
            access_hash: 99,
            file_reference: vec![1, 2, 3],
            dc_id: 2,
            size: 1024,
            ..Default::default()
        }
    }

    #[test]
    fn resave_merges_thumbnails_and_filename() {
        let registry = DocumentRegistry::new();

        registry.save(
            RawDocument {
                thumbs: vec![Thumbnail::Sized {
                    size_tag: "s".into(),
                    w: 90,
                    h: 90,
                    size: 800,
                }],
                ..raw(42)
            },
            None,
        );

        let merged = registry.save(
            RawDocument {
                attributes: vec![DocumentAttribute::Filename {
                    file_name: "report.pdf".into(),
                }],
                thumbs: vec![Thumbnail::Sized {
                    size_tag: "x".into(),
                    w: 320,
                    h: 320,
                    size: 9_000,
                }],
                ..raw(42)
            },
            None,
        );

        assert_eq!(merged.file_name.as_deref(), Some("report.pdf"));
        assert_eq!(merged.thumbs.len(), 2);
        assert!(
            matches!(&merged.thumbs[0], Thumbnail::Sized { size_tag, .. } if size_tag == "x"),
            "high-quality thumbnail ordered first"
        );
    }

    #[test]
    fn merge_preserves_cache_state() {
        let registry = DocumentRegistry::new();
        registry.save(raw(7), None);
        registry.mark_downloaded(7);
        registry.set_local_path(7, "/cache/7.bin".into());

        let merged = registry.save(raw(7), None);
        assert!(merged.downloaded);
        assert_eq!(merged.local_path.as_deref(), Some("/cache/7.bin"));
    }

    #[test]
    fn fresher_file_reference_wins() {
        let registry = DocumentRegistry::new();
        registry.save(raw(7), None);
        let merged = registry.save(
            RawDocument {
                file_reference: vec![9, 9],
                ..raw(7)
            },
            None,
        );
        assert_eq!(merged.file_reference, vec![9, 9]);
    }

    #[test]
    fn extras_overlay_on_insert_and_merge() {
        let registry = DocumentRegistry::new();
        let extras = DocumentExtras {
            file_name: Some("override.bin".into()),
            ..Default::default()
        };
        let first = registry.save(raw(1), Some(extras.clone()));
        assert_eq!(first.file_name.as_deref(), Some("override.bin"));

        let merged = registry.save(raw(1), Some(extras));
        assert_eq!(merged.file_name.as_deref(), Some("override.bin"));
    }

    #[test]
    fn unknown_id_is_none() {
        let registry = DocumentRegistry::new();
        assert!(registry.get(404).is_none());
    }

    #[test]
    fn synthesized_filename_shapes() {
        let registry = DocumentRegistry::new();

        let sticker = registry.save(
            RawDocument {
                attributes: vec![DocumentAttribute::Sticker {
                    alt: "⭐".into(),
                    animated: false,
                }],
                ..raw(5)
            },
            None,
        );
        assert_eq!(registry.display_filename(&sticker), "t_sticker5.webp");

        let plain = registry.save(raw(6), None);
        // octet-stream extension is suppressed
        assert_eq!(registry.display_filename(&plain), "t_file6");
    }

    #[test]
    fn locator_carries_thumb_tag() {
        let registry = DocumentRegistry::new();
        let doc = registry.save(raw(5), None);
        let locator = registry.locator(&doc, Some("m"));
        assert_eq!(locator.id, 5);
        assert_eq!(locator.thumb_size.as_deref(), Some("m"));
        assert_eq!(locator.file_reference, vec![1, 2, 3]);
    }
}
