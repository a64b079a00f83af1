//! Posts

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ColumnDef, CreateFor, Entity, EntityMeta};
use crate::repository::{filter, Repository, ScalarValue};
use crate::service::{BaseService, EntityRules};

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+([a-z0-9-]*[a-z0-9])?$").expect("post slug regex is valid")
});

/// Publication states, stored as the `post_status` enum
pub const POST_STATUSES: [&str; 5] = ["DRAFT", "REVIEW", "PUBLISHED", "ARCHIVED", "DELETED"];

/// Audiences a post can be shown to
pub const POST_VISIBILITIES: [&str; 4] = ["public", "private", "unlisted", "members"];

/// Markup formats of the post body
pub const POST_FORMATS: [&str; 4] = ["markdown", "html", "mdx", "plaintext"];

/// A piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Post {
    /// Identity, version and timestamps
    #[serde(flatten)]
    #[cfg_attr(feature = "database", sqlx(flatten))]
    pub meta: EntityMeta,
    /// URL segment, unique per post type
    pub slug: String,
    /// Headline
    pub title: String,
    /// Teaser text
    pub summary: Option<String>,
    /// Body
    pub content: Option<String>,
    /// One of [`POST_STATUSES`]
    pub status: String,
    /// One of [`POST_VISIBILITIES`]
    pub visibility: String,
    /// One of [`POST_FORMATS`]
    pub format: String,
    /// Set once the post goes live
    pub published_at: Option<DateTime<Utc>>,
    /// Author
    pub user_id: i32,
    /// Owning post type
    pub type_id: i32,
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
    const ENTITY_TYPE: &'static str = "post";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::new("slug", "slug", "text"),
        ColumnDef::new("title", "title", "text"),
        ColumnDef::new("summary", "summary", "text"),
        ColumnDef::new("content", "content", "text"),
        ColumnDef::new("status", "status", "post_status"),
        ColumnDef::new("visibility", "visibility", "text"),
        ColumnDef::new("format", "format", "text"),
        ColumnDef::new("publishedAt", "published_at", "timestamp with time zone"),
        ColumnDef::new("userId", "user_id", "integer"),
        ColumnDef::new("typeId", "type_id", "integer"),
    ];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn domain_field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "slug" => Some(self.slug.as_str().into()),
            "title" => Some(self.title.as_str().into()),
            "summary" => self.summary.as_deref().map(Into::into),
            "content" => self.content.as_deref().map(Into::into),
            "status" => Some(self.status.as_str().into()),
            "visibility" => Some(self.visibility.as_str().into()),
            "format" => Some(self.format.as_str().into()),
            "publishedAt" => self.published_at.map(Into::into),
            "userId" => Some(self.user_id.into()),
            "typeId" => Some(self.type_id.into()),
            _ => None,
        }
    }
}

fn default_status() -> String {
    "DRAFT".to_string()
}

fn default_visibility() -> String {
    "public".to_string()
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Fields supplied when creating a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePost {
    /// URL segment
    pub slug: String,
    /// Headline
    pub title: String,
    /// Teaser text
    #[serde(default)]
    pub summary: Option<String>,
    /// Body
    #[serde(default)]
    pub content: Option<String>,
    /// Defaults to `DRAFT`
    #[serde(default = "default_status")]
    pub status: String,
    /// Defaults to `public`
    #[serde(default = "default_visibility")]
    pub visibility: String,
    /// Defaults to `markdown`
    #[serde(default = "default_format")]
    pub format: String,
    /// Publication time
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Author
    pub user_id: i32,
    /// Owning post type
    pub type_id: i32,
}

impl CreatePost {
    /// A public markdown draft with no summary or body
    pub fn new(slug: impl Into<String>, title: impl Into<String>, user_id: i32, type_id: i32) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            summary: None,
            content: None,
            status: default_status(),
            visibility: default_visibility(),
            format: default_format(),
            published_at: None,
            user_id,
            type_id,
        }
    }
}

impl CreateFor<Post> for CreatePost {
    fn into_entity(self, meta: EntityMeta) -> Post {
        Post {
            meta,
            slug: self.slug,
            title: self.title,
            summary: self.summary,
            content: self.content,
            status: self.status,
            visibility: self.visibility,
            format: self.format,
            published_at: self.published_at,
            user_id: self.user_id,
            type_id: self.type_id,
        }
    }
}

/// Slug format, value domains and slug uniqueness per post type
#[derive(Debug, Clone, Copy, Default)]
pub struct PostRules;

impl PostRules {
    fn check_shape(slug: &str, status: &str, visibility: &str, format: &str) -> Result<()> {
        if !SLUG_PATTERN.is_match(slug) {
            return Err(Error::BadRequest(format!("Invalid slug format: '{}'", slug)));
        }
        let domains = [
            ("status", status, &POST_STATUSES[..]),
            ("visibility", visibility, &POST_VISIBILITIES[..]),
            ("format", format, &POST_FORMATS[..]),
        ];
        for (field, value, allowed) in domains {
            if !allowed.contains(&value) {
                return Err(Error::BadRequest(format!(
                    "Invalid {} '{}', expected one of {}",
                    field,
                    value,
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }

    async fn holder_of<R>(repo: &R, tx: &mut R::Tx, type_id: i32, slug: &str) -> Result<Option<Post>>
    where
        R: Repository<Entity = Post>,
    {
        let filters = [filter::equal("typeId", type_id), filter::equal("slug", slug)];
        Ok(repo.find_many(tx, &filters, &[]).await?.pop())
    }
}

impl<R> EntityRules<R> for PostRules
where
    R: Repository<Entity = Post, Create = CreatePost>,
{
    async fn check_create(&self, repo: &R, tx: &mut R::Tx, input: &CreatePost) -> Result<()> {
        Self::check_shape(&input.slug, &input.status, &input.visibility, &input.format)?;
        if Self::holder_of(repo, tx, input.type_id, &input.slug)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "Slug '{}' already exists for this post type",
                input.slug
            )));
        }
        Ok(())
    }

    async fn check_update(&self, repo: &R, tx: &mut R::Tx, current: &Post, next: &Post) -> Result<()> {
        Self::check_shape(&next.slug, &next.status, &next.visibility, &next.format)?;
        if next.slug == current.slug && next.type_id == current.type_id {
            return Ok(());
        }
        match Self::holder_of(repo, tx, next.type_id, &next.slug).await? {
            Some(holder) if holder.meta.id != current.meta.id => Err(Error::Conflict(format!(
                "Slug '{}' already exists for this post type",
                next.slug
            ))),
            _ => Ok(()),
        }
    }
}

/// Service over posts
pub type PostService<R, M> = BaseService<R, M, PostRules>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::TypeMapCache;
    use crate::error::ErrorKind;
    use crate::repository::memory::{MemoryRepository, MemoryStore};
    use crate::repository::Sort;

    type Service = PostService<MemoryRepository<Post, CreatePost>, MemoryStore>;

    fn service() -> Service {
        let store = MemoryStore::new();
        Service::new(
            Arc::new(MemoryRepository::new(store.clone())),
            Arc::new(store),
            Arc::new(TypeMapCache::new()),
        )
    }

    #[test]
    fn test_column_types() {
        let map = Post::type_map();
        assert_eq!(map["status"], crate::repository::ScalarType::String);
        assert_eq!(map["publishedAt"], crate::repository::ScalarType::Datetime);
        assert_eq!(map["typeId"], crate::repository::ScalarType::Int);
        assert_eq!(map.len(), 15);
    }

    #[test]
    fn test_create_defaults_from_json() {
        let input: CreatePost = serde_json::from_value(serde_json::json!({
            "slug": "hello-world",
            "title": "Hello",
            "userId": 1,
            "typeId": 2
        }))
        .unwrap();
        assert_eq!(input.status, "DRAFT");
        assert_eq!(input.visibility, "public");
        assert_eq!(input.format, "markdown");
        assert_eq!(input.summary, None);
    }

    #[tokio::test]
    async fn test_rejects_invalid_domains() {
        let service = service();

        let bad_slug = CreatePost::new("Hello World", "Hello", 1, 1);
        assert_eq!(
            service.create(bad_slug).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );

        let bad_status = CreatePost {
            status: "LIVE".into(),
            ..CreatePost::new("hello", "Hello", 1, 1)
        };
        assert_eq!(
            service.create(bad_status).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }

    #[tokio::test]
    async fn test_slug_unique_per_type() {
        let service = service();
        service.create(CreatePost::new("hello", "Hello", 1, 1)).await.unwrap();

        let err = service
            .create(CreatePost::new("hello", "Again", 1, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // same slug under another post type is fine
        service.create(CreatePost::new("hello", "Other", 1, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_flow() {
        let service = service();
        let draft = service
            .create(CreatePost::new("launch", "Launch", 1, 1))
            .await
            .unwrap();

        let published = service
            .update(
                draft.meta.id,
                Post {
                    status: "PUBLISHED".into(),
                    published_at: Some(Utc::now()),
                    ..draft.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(published.meta.version, 1);

        let live = service
            .get_many(
                vec![
                    filter::equal("status", "PUBLISHED"),
                    filter::not_null("publishedAt"),
                ],
                vec![Sort::desc("publishedAt")],
            )
            .await
            .unwrap();
        assert_eq!(live, vec![published]);
    }
}
