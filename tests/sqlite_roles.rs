//! Integration tests for the SQLite role store and ability construction.

use admin_access::ability::AbilityFactory;
use admin_access::roles::{RoleStore, SqliteRoleStore};
use admin_access::{AccessError, Action, Grant};
use anyhow::Result;
use serde_json::Value;

async fn insert_raw(store: &SqliteRoleStore, id: i64, name: &str, access: Option<&str>) -> Result<()> {
    sqlx::query("INSERT INTO roles (id, name, access) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(access)
        .execute(store.pool())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_canonical_roundtrip_through_factory() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    store
        .upsert_role(1, "Editor", &[Grant::new("read", "banners"), Grant::new("update", "banners/:id")])
        .await?;

    let role = store.get_role_by_id(1).await?.expect("role exists");
    assert!(matches!(role.access, Some(Value::Array(_))));

    let ability = AbilityFactory::new(store).create(1).await?;
    assert!(ability.can(&Action::Read, "banners"));
    assert!(ability.can(&Action::Update, "banners/:id"));
    assert!(!ability.can(&Action::Delete, "banners/:id"));
    Ok(())
}

#[tokio::test]
async fn test_double_encoded_access_matches_array() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    let array = r#"[{"action":"read","subject":"users"}]"#;
    let encoded = serde_json::to_string(array)?;

    insert_raw(&store, 1, "Canonical", Some(array)).await?;
    insert_raw(&store, 2, "Legacy", Some(&encoded)).await?;

    let factory = AbilityFactory::new(store);
    let canonical = factory.create(1).await?;
    let legacy = factory.create(2).await?;
    assert_eq!(canonical.rules(), legacy.rules());
    assert!(legacy.can(&Action::Read, "users"));
    Ok(())
}

#[tokio::test]
async fn test_null_and_blank_access_are_empty() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    insert_raw(&store, 1, "Null", None).await?;
    insert_raw(&store, 2, "Blank", Some("")).await?;

    let factory = AbilityFactory::new(store);
    assert!(factory.create(1).await?.is_empty());
    assert!(factory.create(2).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_access_is_data_integrity() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    insert_raw(&store, 1, "Broken", Some("not json at all")).await?;
    insert_raw(&store, 2, "Object", Some(r#"{"action":"read"}"#)).await?;

    let factory = AbilityFactory::new(store);
    for id in [1, 2] {
        let err = factory.create(id).await.unwrap_err();
        assert!(
            matches!(err, AccessError::DataIntegrity { role_id, .. } if role_id == id),
            "unexpected error for role {id}: {err}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_role_is_unauthenticated() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    let err = AbilityFactory::new(store).create(99).await.unwrap_err();
    assert!(matches!(err, AccessError::Unauthenticated));
    Ok(())
}

#[tokio::test]
async fn test_canonicalize_rewrites_legacy_rows_once() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    let array = r#"[{"action":"read","subject":"users"}]"#;
    insert_raw(&store, 1, "Legacy", Some(&serde_json::to_string(array)?)).await?;
    insert_raw(&store, 2, "Canonical", Some(array)).await?;
    insert_raw(&store, 3, "Broken", Some(&serde_json::to_string("[{")?)).await?;

    assert_eq!(store.canonicalize_legacy_access().await?, 1);
    assert_eq!(store.canonicalize_legacy_access().await?, 0);

    let (raw,): (String,) = sqlx::query_as("SELECT access FROM roles WHERE id = 1")
        .fetch_one(store.pool())
        .await?;
    assert!(raw.starts_with('['));

    let err = AbilityFactory::new(store).create(3).await.unwrap_err();
    assert!(matches!(err, AccessError::DataIntegrity { .. }));
    Ok(())
}

#[tokio::test]
async fn test_delete_role() -> Result<()> {
    let store = SqliteRoleStore::connect(":memory:").await?;
    store.upsert_role(1, "Editor", &[]).await?;
    assert!(store.delete_role(1).await?);
    assert!(!store.delete_role(1).await?);
    assert!(store.get_role_by_id(1).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_file_database_persists() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("roles.db");
    let path = path.to_string_lossy().to_string();

    {
        let store = SqliteRoleStore::connect(&path).await?;
        store.upsert_role(7, "Auditor", &[Grant::new("export", "reports")]).await?;
        store.pool().close().await;
    }

    let store = SqliteRoleStore::connect(&path).await?;
    let ability = AbilityFactory::new(store).create(7).await?;
    assert!(ability.can(&Action::Export, "reports"));
    Ok(())
}
