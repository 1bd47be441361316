//! Shared helpers for admin-access integration tests.

#![allow(dead_code)]

use admin_access::ability::AbilityFactory;
use admin_access::catalog::{CategoryMeta, MemorySnapshot, PermissionCatalog};
use admin_access::policy::{PolicyEvaluator, Principal};
use admin_access::roles::{InMemoryRoleStore, Role};
use admin_access::AdminRouter;
use axum::body::Body;
use axum::http::{Method, Request};
use serde_json::{Value, json};
use std::sync::Arc;

/// Role with a structured access list.
pub fn role(id: i64, name: &str, grants: &[(&str, &str)]) -> Role {
    let access = grants
        .iter()
        .map(|(action, subject)| json!({ "action": action, "subject": subject }))
        .collect::<Vec<_>>();
    Role {
        id,
        name: name.to_string(),
        access: Some(Value::Array(access)),
    }
}

/// Role whose access list is stored as an encoded string.
pub fn legacy_role(id: i64, name: &str, encoded: &str) -> Role {
    Role {
        id,
        name: name.to_string(),
        access: Some(Value::String(encoded.to_string())),
    }
}

/// Router builder over an in-memory role store.
pub fn admin_router(
    categories: Vec<CategoryMeta>,
    roles: impl IntoIterator<Item = Role>,
) -> AdminRouter<InMemoryRoleStore> {
    let catalog = Arc::new(PermissionCatalog::new(
        categories,
        Box::new(MemorySnapshot::new()),
    ));
    let evaluator = Arc::new(PolicyEvaluator::new(
        AbilityFactory::new(roles.into_iter().collect::<InMemoryRoleStore>()),
        catalog.feature_allowlist(),
    ));
    AdminRouter::new(catalog, evaluator, false)
}

/// Request as upstream authentication would hand it over.
pub fn request(method: Method, uri: &str, principal: Option<Principal>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(principal) = principal {
        builder = builder.extension(principal);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> anyhow::Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
