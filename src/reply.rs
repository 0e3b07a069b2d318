//! Outbound reply values rendered by the host framework.
//!
//! The service never talks to a chat platform directly. Every operation
//! returns [`Reply`] values and the host maps them onto its own primitives
//! (plain text, single image/video, message chain, grouped forward).

use crate::media::{MediaKind, ResolvedMedia};
use serde::{Deserialize, Serialize};

/// One typed media element inside a chain or forward node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
}

impl From<ResolvedMedia> for MediaItem {
    fn from(media: ResolvedMedia) -> Self {
        Self {
            url: media.url,
            kind: media.kind,
        }
    }
}

/// A named sub-message inside a grouped forward bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardNode {
    /// Sender label shown on the sub-message.
    pub name: String,
    pub content: Vec<MediaItem>,
}

/// Outbound reply, host-rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Plain text message.
    Plain(String),
    /// Message chain carrying one or more typed media items.
    Chain(Vec<MediaItem>),
    /// Grouped/forwarded message bundling multiple named sub-messages.
    Forward(Vec<ForwardNode>),
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Reply::Plain(text.into())
    }

    /// Single-image chain.
    pub fn image(url: impl Into<String>) -> Self {
        Reply::Chain(vec![MediaItem {
            url: url.into(),
            kind: MediaKind::Image,
        }])
    }

    /// Single-video chain.
    pub fn video(url: impl Into<String>) -> Self {
        Reply::Chain(vec![MediaItem {
            url: url.into(),
            kind: MediaKind::Video,
        }])
    }

    /// Chain carrying one resolved media item.
    pub fn media(media: ResolvedMedia) -> Self {
        Reply::Chain(vec![media.into()])
    }
}
