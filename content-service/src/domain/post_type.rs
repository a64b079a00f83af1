//! Post types
//!
//! A post type is a kind of content (`blog`, `page`, `news`) identified by a
//! unique lowercase code.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ColumnDef, CreateFor, Entity, EntityMeta};
use crate::repository::{filter, Repository, ScalarValue};
use crate::service::{BaseService, EntityRules};

/// Lowercase alphanumerics, inner `_` and `-` allowed
static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+([a-z0-9_-]*[a-z0-9])?$").expect("post type code regex is valid")
});

/// A kind of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct PostType {
    /// Identity, version and timestamps
    #[serde(flatten)]
    #[cfg_attr(feature = "database", sqlx(flatten))]
    pub meta: EntityMeta,
    /// Unique machine name
    pub code: String,
    /// Display name
    pub name: String,
}

impl PostType {
    /// Whether `code` is a well-formed post type code
    ///
    /// # Example
    ///
    /// ```rust
    /// use content_service::domain::PostType;
    ///
    /// assert!(PostType::is_valid_code("blog"));
    /// assert!(PostType::is_valid_code("landing_page-v2"));
    /// assert!(!PostType::is_valid_code("Blog"));
    /// assert!(!PostType::is_valid_code("blog-"));
    /// ```
    #[must_use]
    pub fn is_valid_code(code: &str) -> bool {
        CODE_PATTERN.is_match(code)
    }
}

impl Entity for PostType {
    const TABLE: &'static str = "post_types";
    const ENTITY_TYPE: &'static str = "post_type";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::new("code", "code", "text"),
        ColumnDef::new("name", "name", "text"),
    ];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn domain_field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "code" => Some(self.code.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }
}

/// Fields supplied when creating a post type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostType {
    /// Unique machine name
    pub code: String,
    /// Display name
    pub name: String,
}

impl CreateFor<PostType> for CreatePostType {
    fn into_entity(self, meta: EntityMeta) -> PostType {
        PostType {
            meta,
            code: self.code,
            name: self.name,
        }
    }
}

/// Code format and code uniqueness
#[derive(Debug, Clone, Copy, Default)]
pub struct PostTypeRules;

impl PostTypeRules {
    fn check_code(code: &str) -> Result<()> {
        if PostType::is_valid_code(code) {
            Ok(())
        } else {
            Err(Error::BadRequest(format!("Invalid code format: '{}'", code)))
        }
    }

    async fn holder_of<R>(repo: &R, tx: &mut R::Tx, code: &str) -> Result<Option<PostType>>
    where
        R: Repository<Entity = PostType>,
    {
        let mut found = repo
            .find_many(tx, &[filter::equal("code", code)], &[])
            .await?;
        Ok(found.pop())
    }
}

impl<R> EntityRules<R> for PostTypeRules
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
{
    async fn check_create(&self, repo: &R, tx: &mut R::Tx, input: &CreatePostType) -> Result<()> {
        Self::check_code(&input.code)?;
        if Self::holder_of(repo, tx, &input.code).await?.is_some() {
            return Err(Error::Conflict("Code already exists".to_string()));
        }
        Ok(())
    }

    async fn check_update(
        &self,
        repo: &R,
        tx: &mut R::Tx,
        current: &PostType,
        next: &PostType,
    ) -> Result<()> {
        if next.code == current.code {
            return Ok(());
        }
        Self::check_code(&next.code)?;
        match Self::holder_of(repo, tx, &next.code).await? {
            Some(holder) if holder.meta.id != current.meta.id => {
                Err(Error::Conflict("Code already exists".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Service over post types
pub type PostTypeService<R, M> = BaseService<R, M, PostTypeRules>;
