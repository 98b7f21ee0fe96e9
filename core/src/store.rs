use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, Fields};

/// How `set_document` treats fields already stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document with the given fields.
    Overwrite,
    /// Write only the given fields, leaving all others untouched.
    Merge,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub documents: Vec<Document>,
    pub next_page_token: Option<String>,
}

/// A hierarchical document store (collections of documents addressed by
/// slash-separated paths).
///
/// The CLI implements this against Firestore over REST; `LocalStore` backs it
/// with SQLite. Any `Value::ServerTimestamp` in written fields is replaced by
/// the store's commit time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List one page of documents directly inside `collection`.
    ///
    /// `page_token` is the `next_page_token` of the previous page, or `None`
    /// for the first page.
    async fn list_documents(
        &self,
        collection: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page>;

    async fn get_document(&self, path: &str) -> Result<Option<Document>>;

    async fn set_document(&self, path: &str, fields: &Fields, mode: SetMode) -> Result<()>;

    /// Create a document with a store-generated id and return that id.
    async fn add_document(&self, collection: &str, fields: &Fields) -> Result<String>;
}
