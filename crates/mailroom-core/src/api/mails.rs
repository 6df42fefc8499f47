//! Mail endpoints

use futures::future::try_join_all;
use reqwest::Method;
use serde::Serialize;

use crate::error::Result;
use crate::models::{
    Mail, MailFilter, MailPage, MailQuery, MailUpdate, VirtualFolder, VirtualFolderCounts,
};

use super::ApiClient;

impl ApiClient {
    /// One page of the mail list
    pub async fn list_mails(&self, query: &MailQuery) -> Result<MailPage> {
        self.get("mails/", &query.to_params()).await
    }

    /// Number of mails matching a filter, read from the pagination block
    pub async fn count_mails(&self, filter: MailFilter) -> Result<u64> {
        let page = self.list_mails(&MailQuery::count_only(filter)).await?;
        Ok(page.pagination.total_count)
    }

    /// Totals for every built-in view, fetched concurrently
    pub async fn virtual_folder_counts(&self) -> Result<VirtualFolderCounts> {
        let counts = try_join_all(
            VirtualFolder::ALL
                .iter()
                .map(|folder| self.count_mails(folder.filter())),
        )
        .await?;

        Ok(VirtualFolderCounts {
            all: counts[0],
            unread: counts[1],
            starred: counts[2],
            unclassified: counts[3],
        })
    }

    pub async fn get_mail(&self, id: i64) -> Result<Mail> {
        self.get(&format!("mails/{}/", id), &[]).await
    }

    pub async fn update_mail(&self, id: i64, update: &MailUpdate) -> Result<()> {
        self.send_unit(Method::PATCH, &format!("mails/{}/", id), Some(update))
            .await
    }

    pub async fn set_starred(&self, id: i64, starred: bool) -> Result<()> {
        self.update_mail(
            id,
            &MailUpdate {
                is_starred: Some(starred),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn move_mail(&self, id: i64, folder_id: i64) -> Result<()> {
        #[derive(Serialize)]
        struct Body {
            folder_id: i64,
        }

        self.send_unit(
            Method::POST,
            &format!("mails/{}/move/", id),
            Some(&Body { folder_id }),
        )
        .await
    }

    pub async fn delete_mail(&self, id: i64) -> Result<()> {
        self.send_unit::<()>(Method::DELETE, &format!("mails/{}/", id), None)
            .await
    }

    /// Delete several mails; the API has no bulk delete so requests run concurrently
    pub async fn delete_mails(&self, ids: &[i64]) -> Result<()> {
        try_join_all(ids.iter().map(|id| self.delete_mail(*id))).await?;
        Ok(())
    }

    pub async fn bulk_move(&self, ids: &[i64], folder_id: i64) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            mail_ids: &'a [i64],
            folder_id: i64,
        }

        self.send_unit(
            Method::POST,
            "mails/bulk-move/",
            Some(&Body {
                mail_ids: ids,
                folder_id,
            }),
        )
        .await
    }

    pub async fn bulk_set_read(&self, ids: &[i64], is_read: bool) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            mail_ids: &'a [i64],
            is_read: bool,
        }

        self.send_unit(
            Method::POST,
            "mails/bulk-update/",
            Some(&Body {
                mail_ids: ids,
                is_read,
            }),
        )
        .await
    }

    /// Raw attachment content
    pub async fn download_attachment(&self, mail_id: i64, attachment_id: &str) -> Result<Vec<u8>> {
        self.get_bytes(&format!(
            "mails/{}/attachments/{}/",
            mail_id,
            urlencode_segment(attachment_id)
        ))
        .await
    }
}

/// Percent-encode a single path segment
fn urlencode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
