//! File-name → document kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a resolved file contains, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Pdf,
    Image,
    Html,
    Unknown,
}

impl Kind {
    /// Case-insensitive suffix match on the file name.
    pub fn from_name(name: &str) -> Kind {
        let lower = name.to_ascii_lowercase();
        let ends = |exts: &[&str]| exts.iter().any(|ext| lower.ends_with(ext));

        if ends(&[".pdf"]) {
            Kind::Pdf
        } else if ends(&[".jpg", ".jpeg", ".png", ".gif"]) {
            Kind::Image
        } else if ends(&[".html", ".htm"]) {
            Kind::Html
        } else {
            Kind::Unknown
        }
    }

    /// Whether the dispatcher has a converter for this kind.
    pub fn is_supported(self) -> bool {
        self != Kind::Unknown
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Pdf => "pdf",
            Kind::Image => "image",
            Kind::Html => "html",
            Kind::Unknown => "unknown",
        })
    }
}
