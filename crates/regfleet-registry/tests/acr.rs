//! ACR adapter tests against a mock catalog API.

mod common;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use common::{registry, requests_with, spawn};
use regfleet_core::options::FORCE_DELETE_ANNOTATION;
use regfleet_core::{ErrorKind, Project, ProviderKind};
use regfleet_registry::{
    create_project, delete_project, member_manager, AcrProvider, ClientConfig, RegistryProvider,
};

async fn catalog_or_missing(Path(path): Path<String>) -> Result<Json<Value>, StatusCode> {
    if path.trim_start_matches('/') != "_catalog" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "repositories": ["tools/kubectl", "os-images/base", "os-images/busybox", "tools/helm"]
    })))
}

async fn acr(annotations: &[(&str, &str)]) -> (AcrProvider, common::RequestLog) {
    let router = Router::new().route(
        "/acr/v1/*path",
        get(catalog_or_missing).delete(|| async { StatusCode::ACCEPTED }),
    );
    let (url, log) = spawn(router).await;
    let provider =
        AcrProvider::new(registry(ProviderKind::Acr, &url, annotations), &ClientConfig::default())
            .unwrap();
    (provider, log)
}

#[tokio::test]
async fn test_projects_are_derived_from_catalog() {
    let (acr, _) = acr(&[]).await;
    let names: Vec<_> = acr
        .list_projects()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["os-images".to_string(), "tools".to_string()]);

    assert_eq!(acr.get_project_by_name("tools").await.unwrap().name, "tools");
    let err = acr.get_project_by_name("nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_repositories_filtered_by_first_segment() {
    let (acr, _) = acr(&[]).await;
    let repositories = acr
        .list_repositories(&Project::new("os-images"))
        .await
        .unwrap();
    let names: Vec<_> = repositories.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["os-images/base", "os-images/busybox"]);
}

#[tokio::test]
async fn test_capabilities_are_absent() {
    let (acr, log) = acr(&[]).await;
    let err = create_project(&acr, "new").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
    assert_eq!(member_manager(&acr).err().map(|e| e.kind()), Some(ErrorKind::NotImplemented));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_delete_project_without_force_is_refused() {
    let (acr, log) = acr(&[]).await;
    let err = delete_project(&acr, &Project::new("tools")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recoverable);
    assert!(requests_with(&log, "DELETE").is_empty());
}

#[tokio::test]
async fn test_force_delete_project_deletes_each_repository() {
    let (acr, log) = acr(&[(FORCE_DELETE_ANNOTATION, "true")]).await;
    delete_project(&acr, &Project::new("tools")).await.unwrap();
    assert_eq!(
        requests_with(&log, "DELETE"),
        vec![
            "DELETE /acr/v1/tools/kubectl".to_string(),
            "DELETE /acr/v1/tools/helm".to_string(),
        ]
    );
}
