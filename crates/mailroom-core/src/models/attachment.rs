//! Attachment data structures

use serde::{Deserialize, Serialize};

/// A mail attachment as listed in the mail detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment ID (used in the download URL)
    pub id: String,

    /// Original filename
    #[serde(alias = "filename")]
    pub name: String,

    /// MIME type
    #[serde(default, alias = "content_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Size in bytes
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    /// Check if this attachment is an image
    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|m| m.starts_with("image/"))
            .unwrap_or(false)
    }

    /// Filename safe to write into a local directory
    pub fn safe_filename(&self) -> String {
        let cleaned: String = self
            .name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                c => c,
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.').trim().to_string();
        if cleaned.is_empty() {
            "attachment".to_string()
        } else {
            cleaned
        }
    }

    /// Get human-readable size
    pub fn size_human(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size >= GB {
            format!("{:.1} GB", self.size as f64 / GB as f64)
        } else if self.size >= MB {
            format!("{:.1} MB", self.size as f64 / MB as f64)
        } else if self.size >= KB {
            format!("{:.1} KB", self.size as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, size: u64) -> Attachment {
        Attachment {
            id: "a1".to_string(),
            name: name.to_string(),
            mime_type: Some("image/png".to_string()),
            size,
        }
    }

    #[test]
    fn test_size_human() {
        assert_eq!(attachment("x", 512).size_human(), "512 bytes");
        assert_eq!(attachment("x", 2048).size_human(), "2.0 KB");
        assert_eq!(attachment("x", 5 * 1024 * 1024).size_human(), "5.0 MB");
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(attachment("../../etc/passwd", 1).safe_filename(), "_.._etc_passwd");
        assert_eq!(attachment("report.pdf", 1).safe_filename(), "report.pdf");
        assert_eq!(attachment("", 1).safe_filename(), "attachment");
        assert!(attachment("x.png", 1).is_image());
    }
}
