//! Folder endpoints

use reqwest::Method;
use serde::Serialize;

use crate::error::Result;
use crate::models::{CreateFolderRequest, Folder, FolderList};

use super::ApiClient;

impl ApiClient {
    /// Folder tree (roots with nested children)
    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        let list: FolderList = self.get("folders/", &[]).await?;
        Ok(list.folders)
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<i64>) -> Result<()> {
        let body = CreateFolderRequest {
            name: name.to_string(),
            parent_id,
        };
        self.send_unit(Method::POST, "folders/", Some(&body)).await
    }

    pub async fn rename_folder(&self, id: i64, name: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
        }

        self.send_unit(Method::PATCH, &format!("folders/{}/", id), Some(&Body { name }))
            .await
    }

    pub async fn delete_folder(&self, id: i64) -> Result<()> {
        self.send_unit::<()>(Method::DELETE, &format!("folders/{}/", id), None)
            .await
    }
}
