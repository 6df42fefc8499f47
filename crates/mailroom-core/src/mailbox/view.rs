//! Mailbox view state: scope, paging, search and selection

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::models::{
    find_folder, flatten_folders, FlatFolder, Folder, Mail, MailListItem, MailPage, MailQuery,
    Pagination, VirtualFolder, VirtualFolderCounts,
};

/// What the mail list is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MailboxScope {
    Virtual(VirtualFolder),
    Folder(i64),
}

impl Default for MailboxScope {
    fn default() -> Self {
        MailboxScope::Virtual(VirtualFolder::All)
    }
}

impl fmt::Display for MailboxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxScope::Virtual(v) => write!(f, "{:?}", v),
            MailboxScope::Folder(id) => write!(f, "folder {}", id),
        }
    }
}

/// Everything a mailbox screen renders
#[derive(Debug, Clone, Serialize)]
pub struct MailboxView {
    pub folders: Vec<Folder>,
    pub scope: MailboxScope,
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub mails: Vec<MailListItem>,
    pub pagination: Pagination,
    pub open_mail: Option<Mail>,
    pub selection: BTreeSet<i64>,
    pub counts: VirtualFolderCounts,
}

impl MailboxView {
    pub fn new(page_size: u32) -> Self {
        Self {
            folders: Vec::new(),
            scope: MailboxScope::default(),
            search: None,
            page: 1,
            page_size,
            mails: Vec::new(),
            pagination: Pagination::default(),
            open_mail: None,
            selection: BTreeSet::new(),
            counts: VirtualFolderCounts::default(),
        }
    }

    /// The list query for the current scope, search and page
    pub fn query(&self) -> MailQuery {
        let mut query = MailQuery {
            page: self.page,
            page_size: self.page_size,
            search: self.search.clone(),
            ..Default::default()
        };
        match self.scope {
            MailboxScope::Virtual(v) => query.filter = v.filter(),
            MailboxScope::Folder(id) => query.folder_id = Some(id),
        }
        query
    }

    /// Switch scope. Resets paging and drops selection and the open mail.
    pub fn set_scope(&mut self, scope: MailboxScope) {
        self.scope = scope;
        self.page = 1;
        self.open_mail = None;
        self.selection.clear();
    }

    pub fn set_search(&mut self, search: Option<String>) {
        self.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.page = 1;
        self.selection.clear();
    }

    /// Move to `page`, clamped to the known page range
    pub fn set_page(&mut self, page: u32) {
        let last = self.pagination.total_pages.max(1);
        self.page = page.clamp(1, last);
        self.selection.clear();
    }

    /// Store a fetched page; selected mails no longer listed are deselected
    pub fn apply_page(&mut self, page: MailPage) {
        self.mails = page.mails;
        self.pagination = page.pagination;
        let listed: BTreeSet<i64> = self.mails.iter().map(|m| m.id).collect();
        self.selection.retain(|id| listed.contains(id));
    }

    pub fn toggle_selected(&mut self, id: i64) -> bool {
        if !self.selection.remove(&id) {
            self.selection.insert(id);
            true
        } else {
            false
        }
    }

    pub fn select_all(&mut self) {
        self.selection = self.mails.iter().map(|m| m.id).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected_ids(&self) -> Vec<i64> {
        self.selection.iter().copied().collect()
    }

    pub fn flat_folders(&self) -> Vec<FlatFolder> {
        flatten_folders(&self.folders)
    }

    /// Forget a deleted folder; falls back to the "all" view if it was open
    pub fn folder_removed(&mut self, id: i64) {
        if self.scope == MailboxScope::Folder(id) {
            self.set_scope(MailboxScope::default());
        }
    }

    /// Human label for the current scope
    pub fn scope_label(&self) -> String {
        match self.scope {
            MailboxScope::Virtual(VirtualFolder::All) => "All mail".to_string(),
            MailboxScope::Virtual(VirtualFolder::Unread) => "Unread".to_string(),
            MailboxScope::Virtual(VirtualFolder::Starred) => "Starred".to_string(),
            MailboxScope::Virtual(VirtualFolder::Unclassified) => "Unclassified".to_string(),
            MailboxScope::Folder(id) => find_folder(&self.folders, id)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| format!("Folder {}", id)),
        }
    }

    pub fn mail_mut(&mut self, id: i64) -> Option<&mut MailListItem> {
        self.mails.iter_mut().find(|m| m.id == id)
    }
}
