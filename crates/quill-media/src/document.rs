//! Canonical media document descriptors.
//!
//! Remote media arrives as a flat id/hash/size record plus a
//! heterogeneous attribute list. [`Document::from_raw`] merges that list
//! into the fixed [`Document`] shape: classification happens once, via a
//! fixed precedence over the attribute variants, and the MIME type is
//! always resolved (explicit attribute wins, else derived from the
//! classification, else octet-stream).

use serde::{Deserialize, Serialize};

/// Generic fallback MIME type for unclassified documents.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME type of raw animated-sticker payloads.
pub const ANIMATED_STICKER_MIME: &str = "application/x-tgsticker";

/// One entry of a raw document's attribute list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentAttribute {
    Filename {
        file_name: String,
    },
    Audio {
        duration: i32,
        voice: bool,
        title: Option<String>,
        performer: Option<String>,
    },
    Video {
        duration: i32,
        w: i32,
        h: i32,
        round: bool,
        supports_streaming: bool,
    },
    ImageSize {
        w: i32,
        h: i32,
    },
    Sticker {
        alt: String,
        animated: bool,
    },
    Animated,
}

/// Display classification of a document. Absent means a generic file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Video,
    RoundVideo,
    Gif,
    Audio,
    Voice,
    Sticker,
    AnimatedSticker,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Video => "video",
            DocumentType::RoundVideo => "round",
            DocumentType::Gif => "gif",
            DocumentType::Audio => "audio",
            DocumentType::Voice => "voice",
            DocumentType::Sticker | DocumentType::AnimatedSticker => "sticker",
        }
    }

    /// Default MIME type for this classification.
    pub fn default_mime(&self) -> &'static str {
        match self {
            DocumentType::Video | DocumentType::RoundVideo | DocumentType::Gif => "video/mp4",
            DocumentType::Audio => "audio/mpeg",
            DocumentType::Voice => "audio/ogg",
            DocumentType::Sticker => "image/webp",
            DocumentType::AnimatedSticker => ANIMATED_STICKER_MIME,
        }
    }
}

/// File extension for a MIME type, used when synthesizing filenames.
/// The implicit octet-stream extension is suppressed.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "video/mp4" => ".mp4",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".ogg",
        "image/webp" => ".webp",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        ANIMATED_STICKER_MIME => ".tgs",
        _ => "",
    }
}

/// A document preview image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Thumbnail {
    /// Tiny inline placeholder, shipped with the descriptor itself.
    Stripped { bytes: Vec<u8> },
    /// A downloadable variant, addressed by its size tag.
    Sized {
        size_tag: String,
        w: i32,
        h: i32,
        size: i64,
    },
}

impl Thumbnail {
    fn merge_key(&self) -> Option<&str> {
        match self {
            Thumbnail::Stripped { .. } => None,
            Thumbnail::Sized { size_tag, .. } => Some(size_tag),
        }
    }

    fn area(&self) -> i64 {
        match self {
            Thumbnail::Stripped { .. } => 0,
            Thumbnail::Sized { w, h, .. } => i64::from(*w) * i64::from(*h),
        }
    }
}

/// Merge an incoming thumbnail list into an existing one: entries are
/// keyed by size tag, sized variants supersede placeholders, and the
/// result is ordered richest-first with placeholders last.
pub fn merge_thumbnails(existing: &mut Vec<Thumbnail>, incoming: Vec<Thumbnail>) {
    for thumb in incoming {
        match existing
            .iter_mut()
            .find(|t| t.merge_key() == thumb.merge_key())
        {
            Some(slot) => *slot = thumb,
            None => existing.push(thumb),
        }
    }
    existing.sort_by_key(|t| std::cmp::Reverse(t.area()));
}

/// Raw descriptor as received from the remote service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawDocument {
    pub id: i64,
    pub access_hash: i64,
    /// Per-session opaque reference required by the transfer layer.
    pub file_reference: Vec<u8>,
    pub dc_id: i32,
    pub size: i64,
    pub mime_type: Option<String>,
    pub attributes: Vec<DocumentAttribute>,
    pub thumbs: Vec<Thumbnail>,
}

/// Canonical, normalized record for one media resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    pub dc_id: i32,
    pub size: i64,

    pub doc_type: Option<DocumentType>,
    pub w: Option<i32>,
    pub h: Option<i32>,
    pub duration: Option<i32>,
    pub file_name: Option<String>,
    pub sticker_alt: Option<String>,
    pub audio_title: Option<String>,
    pub audio_performer: Option<String>,
    pub supports_streaming: bool,
    pub mime_type: String,
    pub thumbs: Vec<Thumbnail>,

    // Cache state, mutated by the resource cache.
    pub downloaded: bool,
    pub local_path: Option<String>,
}

impl Document {
    /// An empty/placeholder descriptor: nothing can be fetched for it.
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    /// Normalize a raw descriptor into the canonical shape.
    pub fn from_raw(raw: RawDocument) -> Self {
        let mut doc = Document {
            id: raw.id,
            access_hash: raw.access_hash,
            file_reference: raw.file_reference,
            dc_id: raw.dc_id,
            size: raw.size,
            mime_type: String::new(),
            ..Default::default()
        };

        let mut audio: Option<(i32, bool)> = None;
        let mut video: Option<(i32, i32, i32, bool, bool)> = None;
        let mut image_size: Option<(i32, i32)> = None;
        let mut sticker: Option<(String, bool)> = None;
        let mut animated = false;

        for attr in raw.attributes {
            match attr {
                DocumentAttribute::Filename { file_name } => doc.file_name = Some(file_name),
                DocumentAttribute::Audio {
                    duration,
                    voice,
                    title,
                    performer,
                } => {
                    audio = Some((duration, voice));
                    doc.audio_title = title;
                    doc.audio_performer = performer;
                }
                DocumentAttribute::Video {
                    duration,
                    w,
                    h,
                    round,
                    supports_streaming,
                } => video = Some((duration, w, h, round, supports_streaming)),
                DocumentAttribute::ImageSize { w, h } => image_size = Some((w, h)),
                DocumentAttribute::Sticker { alt, animated } => sticker = Some((alt, animated)),
                DocumentAttribute::Animated => animated = true,
            }
        }

        // Classification happens once, with a fixed precedence:
        // audio/voice > video/round > sticker > image-size > animated-gif.
        if let Some((duration, voice)) = audio {
            doc.duration = Some(duration);
            doc.doc_type = Some(if voice {
                DocumentType::Voice
            } else {
                DocumentType::Audio
            });
        } else if let Some((duration, w, h, round, streaming)) = video {
            doc.duration = Some(duration);
            doc.w = Some(w);
            doc.h = Some(h);
            doc.supports_streaming = streaming;
            doc.doc_type = Some(if round {
                DocumentType::RoundVideo
            } else if animated {
                DocumentType::Gif
            } else {
                DocumentType::Video
            });
        } else if let Some((alt, animated_sticker)) = sticker {
            doc.sticker_alt = Some(alt);
            let animated_sticker =
                animated_sticker || raw.mime_type.as_deref() == Some(ANIMATED_STICKER_MIME);
            doc.doc_type = Some(if animated_sticker {
                DocumentType::AnimatedSticker
            } else {
                DocumentType::Sticker
            });
            if let Some((w, h)) = image_size {
                doc.w = Some(w);
                doc.h = Some(h);
            }
        } else if let Some((w, h)) = image_size {
            // Dimensions only; an image-sized document stays a generic file.
            doc.w = Some(w);
            doc.h = Some(h);
        } else if animated {
            doc.doc_type = Some(DocumentType::Gif);
        }

        // MIME resolution: explicit attribute wins, then the type table,
        // then the generic fallback.
        doc.mime_type = match raw.mime_type.filter(|m| !m.is_empty()) {
            Some(mime) => mime,
            None => doc
                .doc_type
                .map(|t| t.default_mime().to_string())
                .unwrap_or_else(|| OCTET_STREAM.to_string()),
        };

        merge_thumbnails(&mut doc.thumbs, raw.thumbs);
        doc
    }

    /// Merge a re-sighting of the same identity into this record.
    ///
    /// Classification and MIME stay as derived at first sighting; fresher
    /// addressing fields win, missing metadata is filled in, thumbnail
    /// lists merge, and cache state is preserved.
    pub fn merge(&mut self, newer: Document) {
        debug_assert_eq!(self.id, newer.id);
        self.access_hash = newer.access_hash;
        if !newer.file_reference.is_empty() {
            self.file_reference = newer.file_reference;
        }
        if newer.dc_id != 0 {
            self.dc_id = newer.dc_id;
        }
        if newer.size != 0 {
            self.size = newer.size;
        }
        if self.file_name.is_none() {
            self.file_name = newer.file_name;
        }
        if self.w.is_none() {
            self.w = newer.w;
            self.h = newer.h;
        }
        if self.duration.is_none() {
            self.duration = newer.duration;
        }
        if self.sticker_alt.is_none() {
            self.sticker_alt = newer.sticker_alt;
        }
        if self.audio_title.is_none() {
            self.audio_title = newer.audio_title;
        }
        if self.audio_performer.is_none() {
            self.audio_performer = newer.audio_performer;
        }
        self.supports_streaming |= newer.supports_streaming;
        merge_thumbnails(&mut self.thumbs, newer.thumbs);
    }
}
