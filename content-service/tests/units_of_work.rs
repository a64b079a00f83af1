//! Atomicity, round-trip accounting and type-map caching

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use content_service::prelude::*;

type PostTypes = PostTypeService<MemoryRepository<PostType, CreatePostType>, MemoryStore>;
type Attributes = AttributeService<MemoryRepository<Attribute, CreateAttribute>, MemoryStore>;
type Values =
    AttributeValueService<MemoryRepository<AttributeValue, CreateAttributeValue>, MemoryStore>;

struct Services {
    store: MemoryStore,
    post_types: PostTypes,
    attributes: Attributes,
    values: Arc<Values>,
}

fn services() -> Services {
    let store = MemoryStore::new();
    let cache = Arc::new(TypeMapCache::new());
    let transactions = Arc::new(store.clone());
    Services {
        post_types: PostTypeService::new(
            Arc::new(MemoryRepository::new(store.clone())),
            Arc::clone(&transactions),
            Arc::clone(&cache),
        ),
        attributes: AttributeService::new(
            Arc::new(MemoryRepository::new(store.clone())),
            Arc::clone(&transactions),
            Arc::clone(&cache),
        ),
        values: Arc::new(AttributeValueService::new(
            Arc::new(MemoryRepository::new(store.clone())),
            transactions,
            cache,
        )),
        store,
    }
}

fn post_type(code: &str) -> CreatePostType {
    CreatePostType {
        code: code.to_string(),
        name: code.to_uppercase(),
    }
}

#[tokio::test]
async fn test_failed_related_operation_rolls_back_creation() {
    let s = services();

    let err = s
        .post_types
        .create_with_related_operations(post_type("blog"), |_, _| {
            Box::pin(async { Err::<(), _>(Error::BadRequest("related work failed".into())) })
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    assert_eq!(s.post_types.count(vec![]).await.unwrap(), 0);
    assert!(s
        .post_types
        .get_many(vec![filter::equal("code", "blog")], vec![])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_related_operation_commits_with_creation() {
    let s = services();
    let featured = s
        .attributes
        .create(CreateAttribute::new("post_type", "featured", "bool"))
        .await
        .unwrap();

    let values = Arc::clone(&s.values);
    let blog = s
        .post_types
        .create_with_related_operations(post_type("blog"), move |tx, created| {
            Box::pin(async move {
                let value = CreateAttributeValue::for_attribute(&featured, created.meta.id, true)?;
                values.create_in(tx, value).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    s.post_types.create(post_type("page")).await.unwrap();

    let featured_types = s
        .post_types
        .get_many(vec!["@featured:eq:true:bool".parse().unwrap()], vec![])
        .await
        .unwrap();
    assert_eq!(featured_types, vec![blog]);
}

#[tokio::test]
async fn test_update_multiple_is_all_or_nothing() {
    let s = services();
    let blog = s.post_types.create(post_type("blog")).await.unwrap();
    let page = s.post_types.create(post_type("page")).await.unwrap();

    let err = s
        .post_types
        .update_multiple(vec![
            (
                blog.meta.id,
                PostType {
                    name: "Renamed".into(),
                    ..blog.clone()
                },
            ),
            (
                page.meta.id,
                PostType {
                    meta: EntityMeta {
                        version: 7,
                        ..page.meta.clone()
                    },
                    ..page.clone()
                },
            ),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(s.post_types.get_by_id(blog.meta.id).await.unwrap(), blog);
    assert_eq!(s.post_types.get_by_id(page.meta.id).await.unwrap(), page);

    let updated = s
        .post_types
        .update_multiple(vec![
            (
                blog.meta.id,
                PostType {
                    name: "Renamed".into(),
                    ..blog.clone()
                },
            ),
            (page.meta.id, page.clone()),
        ])
        .await
        .unwrap();
    assert!(updated.iter().all(|p| p.meta.version == 1));
}

#[tokio::test]
async fn test_empty_inputs_skip_storage() {
    let s = services();
    s.post_types.create(post_type("blog")).await.unwrap();

    let before = s.store.round_trips();
    assert!(s.post_types.get_by_ids(&[]).await.unwrap().is_empty());
    assert!(s.post_types.get_by_uids(&[]).await.unwrap().is_empty());
    assert_eq!(s.post_types.delete_by_ids(&[]).await.unwrap(), 0);
    assert_eq!(s.post_types.delete_by_uids(&[]).await.unwrap(), 0);
    assert_eq!(s.store.round_trips(), before);
}

#[tokio::test]
async fn test_type_maps_are_loaded_once() {
    let s = services();
    s.attributes
        .create(CreateAttribute::new("post_type", "priority", "int"))
        .await
        .unwrap();

    let first = s.post_types.get_property_type_map().await.unwrap();
    let second = s.post_types.get_property_type_map().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first["code"], ScalarType::String);

    let before = s.store.round_trips();
    let attributes = s.post_types.get_attribute_type_map().await.unwrap();
    let after_first = s.store.round_trips();
    assert_eq!(after_first - before, 1);
    assert_eq!(attributes["priority"], ScalarType::Int);

    assert_eq!(s.post_types.get_attribute_type_map().await.unwrap(), attributes);
    assert_eq!(s.store.round_trips(), after_first);

    // clearing forces a reload
    s.post_types.cache().clear();
    assert_eq!(s.post_types.get_attribute_type_map().await.unwrap(), attributes);
    assert_eq!(s.store.round_trips(), after_first + 1);
}

#[tokio::test]
async fn test_new_attributes_are_filterable_after_warm_cache() {
    let s = services();
    let blog = s.post_types.create(post_type("blog")).await.unwrap();
    assert_eq!(s.post_types.get_many(vec![], vec![]).await.unwrap(), vec![blog.clone()]);

    s.attributes
        .create(CreateAttribute::new("post_type", "rating", "float"))
        .await
        .unwrap();
    let unrated = s
        .post_types
        .get_many(vec!["@rating:isnull".parse().unwrap()], vec![])
        .await
        .unwrap();
    assert_eq!(unrated, vec![blog]);
}

#[tokio::test]
async fn test_loader_errors_are_not_cached() {
    let cache = TypeMapCache::new();
    let calls = AtomicUsize::new(0);

    let failed = cache
        .get_or_compute(CacheNamespace::FieldTypeMap, "post_types", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<TypeMap, _>("storage unavailable")
        })
        .await;
    assert!(failed.is_err());
    assert!(cache.is_empty());

    for _ in 0..2 {
        let map = cache
            .get_or_compute(CacheNamespace::FieldTypeMap, "post_types", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(TypeMap::from([("id".to_string(), ScalarType::Int)]))
            })
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
