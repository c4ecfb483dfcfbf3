//! Integration tests for the repository model cache

mod common;

use gitmind_lib::services::cache_service::cache_path;
use gitmind_lib::services::{CacheService, RepositoryService};

#[tokio::test]
async fn test_cache_survives_service_instances() {
    let (dir, repo) = common::setup_repo();
    common::commit_file(&repo, dir.path(), "two.txt", "2", "Second");

    let model = RepositoryService::default().refresh(dir.path()).await.unwrap();
    assert_eq!(model.commit_count(), 2);

    let cached = CacheService::new()
        .try_get_repository(dir.path())
        .await
        .expect("Cache not readable");
    assert_eq!(cached.commit_count(), 2);
    assert_eq!(cached.current_branch, model.current_branch);
    assert_eq!(cached.working_folder(), dir.path());

    let head = repo.head().unwrap().target().unwrap().to_string();
    let commit = cached.commit(&head).expect("HEAD missing from cache");
    assert_eq!(commit.subject, "Second");
    assert_eq!(commit.parent_ids.len(), 1);
}

#[tokio::test]
async fn test_corrupt_cache_is_rebuilt() {
    let (dir, _repo) = common::setup_repo();
    std::fs::write(cache_path(dir.path()), b"not a cache").unwrap();

    let service = RepositoryService::default();
    assert!(service.cache().try_get_repository(dir.path()).await.is_none());

    let model = service.load(dir.path()).await.unwrap();
    assert_eq!(model.commit_count(), 1);
    assert!(service.cache().try_get_repository(dir.path()).await.is_some());
}

#[tokio::test]
async fn test_clear_removes_cache() {
    let (dir, _repo) = common::setup_repo();
    let service = RepositoryService::default();
    service.load(dir.path()).await.unwrap();

    assert!(service.invalidate(dir.path()).await);
    assert!(!cache_path(dir.path()).exists());
    assert!(!service.invalidate(dir.path()).await);
}
