use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{Category, Genre},
};

/// One search hit as the provider reports it, before genre/category stamping.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMovie {
    pub title: String,
    pub year: i32,
    pub distribution: String,
    pub description: String,
    pub url: String,
    pub cover_photo: String,
}

/// Paginated cursor over one (genre, category) search. Finite and
/// non-restartable: after `next_page` returns `None` it stays exhausted.
#[async_trait]
pub trait PageStream: Send {
    async fn next_page(&mut self) -> AppResult<Option<Vec<SourceMovie>>>;
}

/// External search provider. `limit` is a soft ceiling the provider is asked
/// to respect; pages are never split to land on it exactly.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn search(
        &self,
        genre: Genre,
        category: Category,
        limit: u64,
    ) -> AppResult<Box<dyn PageStream>>;
}
