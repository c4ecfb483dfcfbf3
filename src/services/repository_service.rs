//! Repository model building and cache-backed loading

use std::collections::HashSet;
use std::path::Path;

use crate::error::{GitMindError, Result};
use crate::models::{MBranch, MCommit, MMerge, MRepository};
use crate::services::cache_service::CacheService;

/// Upper bound on commits read into one model
const MAX_COMMITS: usize = 100_000;

/// Build a repository model by walking all refs
pub fn build_repository(working_folder: &Path) -> Result<MRepository> {
    let repo = git2::Repository::open(working_folder)
        .map_err(|_| GitMindError::RepositoryNotFound(working_folder.display().to_string()))?;
    let mut model = MRepository::new(working_folder);

    let head = repo.head().ok();
    model.current_branch = head
        .as_ref()
        .filter(|h| h.is_branch())
        .and_then(|h| h.shorthand())
        .map(str::to_string);

    for item in repo.branches(None)? {
        let (branch, branch_type) = item?;
        // Symbolic refs such as origin/HEAD have no direct target
        let (Some(name), Some(tip)) = (branch.name()?, branch.get().target()) else {
            continue;
        };
        model.branches.push(MBranch {
            name: name.to_string(),
            tip_id: tip.to_string(),
            is_remote: branch_type == git2::BranchType::Remote,
            is_current: branch.is_head(),
        });
    }
    // Current branch first, then locals, so they claim commits first
    model
        .branches
        .sort_by_key(|b| (!b.is_current, b.is_remote, b.name.clone()));

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
    for branch in &model.branches {
        if let Ok(oid) = git2::Oid::from_str(&branch.tip_id) {
            revwalk.push(oid)?;
        }
    }
    if let Some(target) = head.as_ref().and_then(|h| h.target()) {
        revwalk.push(target)?;
    }

    for oid_result in revwalk {
        if model.commit_count() >= MAX_COMMITS {
            tracing::warn!(
                "Stopped reading {} after {} commits",
                working_folder.display(),
                MAX_COMMITS
            );
            break;
        }

        let oid = match oid_result {
            Ok(o) => o,
            Err(_) => continue,
        };
        let commit = match repo.find_commit(oid) {
            Ok(c) => c,
            Err(_) => continue,
        };

        let parent_ids: Vec<String> = commit.parent_ids().map(|p| p.to_string()).collect();
        for merged in parent_ids.iter().skip(1) {
            model.merges.push(MMerge {
                commit_id: oid.to_string(),
                merged_parent_id: merged.clone(),
            });
        }

        model.add_commit(MCommit {
            id: oid.to_string(),
            parent_ids,
            subject: commit.summary().unwrap_or("").to_string(),
            author: commit.author().name().unwrap_or("").to_string(),
            author_date: commit.author().when().seconds(),
            branch_name: None,
        });
    }

    assign_branch_names(&mut model);
    Ok(model)
}

/// Label each commit with the first branch whose first-parent chain
/// reaches it.
fn assign_branch_names(model: &mut MRepository) {
    let mut labelled = HashSet::new();
    let branches: Vec<(String, String)> = model
        .branches
        .iter()
        .map(|b| (b.name.clone(), b.tip_id.clone()))
        .collect();

    for (name, tip) in branches {
        let mut current = Some(tip);
        while let Some(id) = current.take() {
            if !labelled.insert(id.clone()) {
                break;
            }
            let Some(index) = model.commit_index(&id) else {
                break;
            };
            let commit = &mut model.commits[index];
            commit.branch_name = Some(name.clone());
            current = commit.parent_ids.first().cloned();
        }
    }
}

/// Loads repository models from the cache, rebuilding when needed
#[derive(Clone, Default)]
pub struct RepositoryService {
    cache: CacheService,
}

impl RepositoryService {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Cached model if valid, otherwise a fresh build
    pub async fn load(&self, working_folder: &Path) -> Result<MRepository> {
        if let Some(model) = self.cache.try_get_repository(working_folder).await {
            return Ok(model);
        }
        tracing::info!("No usable cache for {}, rebuilding", working_folder.display());
        self.refresh(working_folder).await
    }

    /// Rebuild the model from git and rewrite the cache
    pub async fn refresh(&self, working_folder: &Path) -> Result<MRepository> {
        let folder = working_folder.to_path_buf();
        let model = tokio::task::spawn_blocking(move || build_repository(&folder))
            .await
            .map_err(|e| GitMindError::OperationFailed(format!("Build task failed: {}", e)))??;

        if let Err(e) = self.cache.cache(&model).await {
            tracing::warn!(
                "Failed to cache {}: {}",
                working_folder.display(),
                e
            );
        }
        Ok(model)
    }

    /// Drop the cached model so the next load rebuilds it
    pub async fn invalidate(&self, working_folder: &Path) -> bool {
        self.cache.try_delete_cache(working_folder).await
    }
}
