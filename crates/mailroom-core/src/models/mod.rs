//! Data models for Mailroom
//!
//! Wire structures for users, folders, mails and server-side jobs.

mod attachment;
mod folder;
mod job;
mod mail;
mod user;

pub use attachment::*;
pub use folder::*;
pub use job::*;
pub use mail::*;
pub use user::*;
