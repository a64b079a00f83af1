//! Content domain entities and their business rules
//!
//! - [`PostType`]: kinds of content (blog, page, ...), identified by a code
//! - [`Post`]: a piece of content of one post type
//! - [`Attribute`] / [`AttributeValue`]: EAV definitions and values that
//!   extend any entity kind with typed, dynamically declared fields
//!
//! Each kind comes with its creation input, an [`EntityRules`] implementation
//! and a service alias over [`BaseService`].
//!
//! [`EntityRules`]: crate::service::EntityRules
//! [`BaseService`]: crate::service::BaseService

mod attribute;
mod post;
mod post_type;

pub use attribute::{
    Attribute, AttributeRules, AttributeService, AttributeValue, AttributeValueService,
    CreateAttribute, CreateAttributeValue,
};
pub use post::{
    CreatePost, Post, PostRules, PostService, POST_FORMATS, POST_STATUSES, POST_VISIBILITIES,
};
pub use post_type::{CreatePostType, PostType, PostTypeRules, PostTypeService};
