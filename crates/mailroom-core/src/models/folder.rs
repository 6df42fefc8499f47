//! Folder tree structures

use serde::{Deserialize, Serialize};

/// A mail folder; the server returns roots with nested `children`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,

    #[serde(default)]
    pub unread_count: u64,

    #[serde(default)]
    pub mail_count: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Folder>,
}

/// A folder flattened out of the tree, with its nesting depth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatFolder {
    pub id: i64,
    pub name: String,
    pub depth: usize,
    pub unread_count: u64,
    pub mail_count: u64,
}

impl Folder {
    /// Depth-first walk of this folder and its descendants
    pub fn flatten_into(&self, depth: usize, out: &mut Vec<FlatFolder>) {
        out.push(FlatFolder {
            id: self.id,
            name: self.name.clone(),
            depth,
            unread_count: self.unread_count,
            mail_count: self.mail_count,
        });
        for child in &self.children {
            child.flatten_into(depth + 1, out);
        }
    }

    /// Find a folder anywhere below (and including) this one
    pub fn find(&self, id: i64) -> Option<&Folder> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

/// Flatten a list of root folders in display order
pub fn flatten_folders(roots: &[Folder]) -> Vec<FlatFolder> {
    let mut out = Vec::new();
    for root in roots {
        root.flatten_into(0, &mut out);
    }
    out
}

/// Find a folder by ID in a list of roots
pub fn find_folder(roots: &[Folder], id: i64) -> Option<&Folder> {
    roots.iter().find_map(|f| f.find(id))
}

/// Find a folder by name (case-insensitive) in a list of roots
pub fn find_folder_by_name<'a>(roots: &'a [Folder], name: &str) -> Option<&'a Folder> {
    fn walk<'a>(folder: &'a Folder, name: &str) -> Option<&'a Folder> {
        if folder.name.eq_ignore_ascii_case(name) {
            return Some(folder);
        }
        folder.children.iter().find_map(|c| walk(c, name))
    }
    roots.iter().find_map(|f| walk(f, name))
}

/// Response body of `GET /folders/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderList {
    #[serde(default)]
    pub folders: Vec<Folder>,
}

/// Body of `POST /folders/`
#[derive(Debug, Clone, Serialize)]
pub struct CreateFolderRequest {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}
