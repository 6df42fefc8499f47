//! Mail data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Attachment;

/// Mail address with optional display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Display name (e.g., "John Doe")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Mail address (e.g., "john@example.com")
    pub email: String,
}

impl Address {
    /// Name if known, otherwise the address
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(f, "{} <{}>", name, self.email),
            _ => write!(f, "{}", self.email),
        }
    }
}

/// Folder reference embedded in a mail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: i64,
    pub name: String,
}

/// A row in the mail list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailListItem {
    pub id: i64,

    #[serde(default)]
    pub subject: String,

    pub from: Address,

    /// Preview snippet of the body
    #[serde(default, alias = "snippet")]
    pub body_preview: String,

    pub received_at: DateTime<Utc>,

    #[serde(default)]
    pub is_read: bool,

    #[serde(default)]
    pub is_starred: bool,

    #[serde(default = "default_true")]
    pub is_classified: bool,

    #[serde(default)]
    pub has_attachments: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderRef>,
}

/// Full mail as shown in the detail pane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mail {
    pub id: i64,

    #[serde(default)]
    pub subject: String,

    pub from: Address,

    #[serde(default)]
    pub to: Vec<Address>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Address>,

    pub received_at: DateTime<Utc>,

    /// Plain text body
    #[serde(default, alias = "body")]
    pub body_text: String,

    /// HTML body (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,

    #[serde(default)]
    pub is_read: bool,

    #[serde(default)]
    pub is_starred: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Mail {
    /// Look up an attachment by ID
    pub fn attachment(&self, attachment_id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id == attachment_id)
    }
}

/// Page metadata returned with every list query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total_count: u64,

    #[serde(default)]
    pub total_pages: u32,

    #[serde(default = "default_page", alias = "page")]
    pub current_page: u32,

    #[serde(default)]
    pub page_size: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }
}

/// Response body of `GET /mails/`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailPage {
    #[serde(default)]
    pub mails: Vec<MailListItem>,

    #[serde(default)]
    pub pagination: Pagination,
}

/// Built-in views that filter the whole mailbox rather than one folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualFolder {
    All,
    Unread,
    Starred,
    Unclassified,
}

impl VirtualFolder {
    pub const ALL: [VirtualFolder; 4] = [
        VirtualFolder::All,
        VirtualFolder::Unread,
        VirtualFolder::Starred,
        VirtualFolder::Unclassified,
    ];

    /// Filter flags for this view
    pub fn filter(self) -> MailFilter {
        let mut filter = MailFilter::default();
        match self {
            VirtualFolder::All => {}
            VirtualFolder::Unread => filter.is_read = Some(false),
            VirtualFolder::Starred => filter.is_starred = Some(true),
            VirtualFolder::Unclassified => filter.is_classified = Some(false),
        }
        filter
    }
}

impl std::str::FromStr for VirtualFolder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "unread" => Ok(Self::Unread),
            "starred" => Ok(Self::Starred),
            "unclassified" => Ok(Self::Unclassified),
            other => Err(format!("unknown virtual folder: {}", other)),
        }
    }
}

/// Boolean filters accepted by `GET /mails/`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_classified: Option<bool>,
}

/// A mail list query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailQuery {
    pub page: u32,

    pub page_size: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,

    #[serde(flatten)]
    pub filter: MailFilter,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Default for MailQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            folder_id: None,
            filter: MailFilter::default(),
            search: None,
        }
    }
}

impl MailQuery {
    /// Cheapest query that still reports `total_count` for a filter
    pub fn count_only(filter: MailFilter) -> Self {
        Self {
            page: 1,
            page_size: 1,
            folder_id: None,
            filter,
            search: None,
        }
    }

    /// Query-string pairs in the form the API expects
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(folder_id) = self.folder_id {
            params.push(("folder_id", folder_id.to_string()));
        }
        if let Some(v) = self.filter.is_read {
            params.push(("is_read", v.to_string()));
        }
        if let Some(v) = self.filter.is_starred {
            params.push(("is_starred", v.to_string()));
        }
        if let Some(v) = self.filter.is_classified {
            params.push(("is_classified", v.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.to_string()));
        }
        params
    }
}

/// Totals shown next to the built-in views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFolderCounts {
    pub all: u64,
    pub unread: u64,
    pub starred: u64,
    pub unclassified: u64,
}

impl VirtualFolderCounts {
    pub fn get(&self, folder: VirtualFolder) -> u64 {
        match folder {
            VirtualFolder::All => self.all,
            VirtualFolder::Unread => self.unread,
            VirtualFolder::Starred => self.starred,
            VirtualFolder::Unclassified => self.unclassified,
        }
    }
}

/// Body of `PATCH /mails/{id}/`
#[derive(Debug, Clone, Default, Serialize)]
pub struct MailUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
}

fn default_true() -> bool {
    true
}

fn default_page() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_list_item_wire_format() {
        let json = r#"{
            "id": 7,
            "subject": "Quarterly report",
            "from": {"name": "Finance", "email": "finance@example.com"},
            "snippet": "Numbers attached",
            "received_at": "2024-05-01T09:30:00Z",
            "is_read": false,
            "is_starred": true
        }"#;
        let item: MailListItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.body_preview, "Numbers attached");
        assert!(item.is_starred);
        assert!(item.is_classified);
        assert_eq!(item.from.to_string(), "Finance <finance@example.com>");
    }

    #[test]
    fn test_query_params() {
        let query = MailQuery {
            page: 2,
            folder_id: Some(5),
            filter: VirtualFolder::Unclassified.filter(),
            search: Some("invoice".to_string()),
            ..Default::default()
        };
        let params = query.to_params();
        assert!(params.contains(&("page", "2".to_string())));
        assert!(params.contains(&("folder_id", "5".to_string())));
        assert!(params.contains(&("is_classified", "false".to_string())));
        assert!(params.contains(&("search", "invoice".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "is_read"));
    }

    #[test]
    fn test_blank_search_is_dropped() {
        let query = MailQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!query.to_params().iter().any(|(k, _)| *k == "search"));
    }

    #[test]
    fn test_pagination_navigation() {
        let page = Pagination {
            total_count: 45,
            total_pages: 3,
            current_page: 2,
            page_size: 20,
        };
        assert!(page.has_next());
        assert!(page.has_previous());
    }
}
