//! Client for the article persistence API.
//!
//! The API is an external collaborator; this module only speaks its HTTP
//! contract:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`ArticleStore::list_articles`] | `GET /articles` (newest first) |
//! | [`ArticleStore::latest_original`] | `GET /articles/latest` (404 when none) |
//! | [`ArticleStore::create_article`] | `POST /articles` |
//!
//! Every payload is wrapped in `{"data": ...}`.

use crate::error::StoreError;
use crate::models::{Article, Envelope, NewArticle};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Read and write access to article records.
pub trait ArticleStore {
    async fn list_articles(&self) -> Result<Vec<Article>, StoreError>;

    /// Most recent original, or `None` when the API has none.
    async fn latest_original(&self) -> Result<Option<Article>, StoreError>;

    async fn create_article(&self, article: &NewArticle) -> Result<Article, StoreError>;

    /// Record whose `source_url` equals `url` exactly.
    async fn find_by_source_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        Ok(self
            .list_articles()
            .await?
            .into_iter()
            .find(|a| a.source_url == url))
    }
}

/// [`ArticleStore`] over the JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpArticleStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArticleStore {
    /// Client for the API rooted at `base_url`; a trailing slash is ignored.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: Envelope<T> = resp.json().await?;
        Ok(envelope.data)
    }
}

impl ArticleStore for HttpArticleStore {
    #[instrument(level = "info", skip_all)]
    async fn list_articles(&self) -> Result<Vec<Article>, StoreError> {
        let resp = self
            .client
            .get(self.url("/articles"))
            .header("Accept", "application/json")
            .send()
            .await?;
        let articles: Vec<Article> = Self::read(resp).await?;
        info!(count = articles.len(), "Fetched article list");
        Ok(articles)
    }

    #[instrument(level = "info", skip_all)]
    async fn latest_original(&self) -> Result<Option<Article>, StoreError> {
        let resp = self
            .client
            .get(self.url("/articles/latest"))
            .header("Accept", "application/json")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("No original article available");
            return Ok(None);
        }
        Self::read(resp).await.map(Some)
    }

    #[instrument(level = "info", skip_all, fields(title = %article.title))]
    async fn create_article(&self, article: &NewArticle) -> Result<Article, StoreError> {
        let resp = self
            .client
            .post(self.url("/articles"))
            .header("Accept", "application/json")
            .json(article)
            .send()
            .await?;
        let created: Article = Self::read(resp).await?;
        info!(id = created.id, "Created article");
        Ok(created)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory store, newest first like the real API.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        pub articles: Mutex<Vec<Article>>,
    }

    impl MemoryStore {
        pub fn with(articles: Vec<Article>) -> Self {
            Self {
                articles: Mutex::new(articles),
            }
        }

        pub fn snapshot(&self) -> Vec<Article> {
            self.articles.lock().unwrap().clone()
        }
    }

    impl ArticleStore for MemoryStore {
        async fn list_articles(&self) -> Result<Vec<Article>, StoreError> {
            Ok(self.snapshot())
        }

        async fn latest_original(&self) -> Result<Option<Article>, StoreError> {
            Ok(self.snapshot().into_iter().find(|a| a.is_original()))
        }

        async fn create_article(&self, new: &NewArticle) -> Result<Article, StoreError> {
            let mut articles = self.articles.lock().unwrap();
            let id = articles.iter().map(|a| a.id).max().unwrap_or(0) + 1;
            let article = Article {
                id,
                title: new.title.clone(),
                slug: new.slug.clone().unwrap_or_default(),
                content: new.content.clone(),
                excerpt: new.excerpt.clone(),
                author: new.author.clone(),
                published_date: new.published_date.clone(),
                image_url: new.image_url.clone(),
                source_url: new.source_url.clone(),
                is_updated: new.is_updated,
                original_article_id: new.original_article_id,
                references: new
                    .references
                    .as_ref()
                    .map(|r| serde_json::to_value(r).unwrap()),
                created_at: None,
                updated_at: None,
            };
            articles.insert(0, article.clone());
            Ok(article)
        }
    }

    #[test]
    fn test_base_url_is_normalized() {
        let store = HttpArticleStore::new("http://localhost:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(store.url("/articles/latest"), "http://localhost:8000/api/articles/latest");
    }

    #[tokio::test]
    async fn test_find_by_source_url_matches_exactly() {
        let mut a = crate::models::tests::article(1, false, None);
        a.source_url = "https://beyondchats.com/blogs/a/".into();
        let store = MemoryStore::with(vec![a]);

        assert!(store
            .find_by_source_url("https://beyondchats.com/blogs/a/")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_source_url("https://beyondchats.com/blogs/a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_created_record_is_listed_first_and_findable() {
        let store = MemoryStore::with(vec![crate::models::tests::article(1, false, None)]);
        let created = store
            .create_article(&NewArticle {
                title: "Fresh".into(),
                content: "<p>body</p>".into(),
                source_url: "https://beyondchats.com/blogs/fresh/".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.id, 2);
        let listed = store.list_articles().await.unwrap();
        assert_eq!(listed[0].id, 2);
        assert_eq!(store.latest_original().await.unwrap().unwrap().id, 2);
        let found = store
            .find_by_source_url("https://beyondchats.com/blogs/fresh/")
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.title), Some("Fresh".to_string()));
    }
}
