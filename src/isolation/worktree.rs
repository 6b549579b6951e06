use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::context::{new_context_id, sanitize_label, IsolationContext, IsolationProvider};
use super::semaphore::GitSemaphore;
use crate::errors::ReviewError;
use crate::models::finding::SourceId;

struct WorktreeEntry {
    name: String,
    storage: PathBuf,
    state_namespace: PathBuf,
}

/// Gives every context its own git worktree checked out from `HEAD`.
pub struct WorktreeProvider {
    repo_path: PathBuf,
    base_dir: PathBuf,
    git_lock: GitSemaphore,
    active: DashMap<String, WorktreeEntry>,
}

impl WorktreeProvider {
    pub fn new(repo_path: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            base_dir: base_dir.into(),
            git_lock: GitSemaphore::new(),
            active: DashMap::new(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}

fn add_worktree(repo_path: &Path, name: &str, storage: &Path) -> Result<(), ReviewError> {
    let repo = git2::Repository::open(repo_path)
        .map_err(|e| ReviewError::Provisioning(format!("Failed to open repo: {}", e)))?;

    repo.head()
        .and_then(|h| h.peel_to_commit())
        .map_err(|e| ReviewError::Provisioning(format!("Repository has no HEAD commit: {}", e)))?;

    repo.worktree(name, storage, None)
        .map_err(|e| ReviewError::Provisioning(format!("Failed to add worktree {}: {}", name, e)))?;
    Ok(())
}

fn remove_worktree(repo_path: &Path, name: &str) -> Result<(), ReviewError> {
    let repo = git2::Repository::open(repo_path)?;
    let worktree = repo.find_worktree(name)?;

    let mut opts = git2::WorktreePruneOptions::new();
    opts.valid(true).working_tree(true);
    worktree.prune(Some(&mut opts))?;

    // libgit2 creates a branch named after the worktree; drop it with the tree.
    if let Ok(mut branch) = repo.find_branch(name, git2::BranchType::Local) {
        branch.delete()?;
    }
    Ok(())
}

#[async_trait]
impl IsolationProvider for WorktreeProvider {
    async fn acquire(&self, label: &SourceId) -> Result<IsolationContext, ReviewError> {
        let (context_id, short) = new_context_id();
        let name = format!("crossreview-{}-{}", sanitize_label(label.as_str()), short);
        let storage = self.base_dir.join("worktrees").join(&name);
        let state_namespace = self.base_dir.join("state").join(&name);

        for dir in [storage.parent(), Some(state_namespace.as_path())].into_iter().flatten() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ReviewError::Provisioning(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let added = {
            let _permit = self.git_lock.acquire().await?;
            let repo_path = self.repo_path.clone();
            let wt_name = name.clone();
            let wt_storage = storage.clone();
            tokio::task::spawn_blocking(move || add_worktree(&repo_path, &wt_name, &wt_storage))
                .await
                .map_err(|e| ReviewError::Internal(format!("Worktree task panicked: {}", e)))
                .and_then(|r| r)
        };
        if let Err(e) = added {
            let _ = tokio::fs::remove_dir_all(&state_namespace).await;
            return Err(e);
        }

        self.active.insert(
            context_id.clone(),
            WorktreeEntry {
                name: name.clone(),
                storage: storage.clone(),
                state_namespace: state_namespace.clone(),
            },
        );
        info!(label = %label, worktree = %name, "Worktree context acquired");

        Ok(IsolationContext {
            context_id,
            label: label.clone(),
            storage,
            state_namespace,
        })
    }

    async fn release(&self, context: &IsolationContext) {
        let Some((_, entry)) = self.active.remove(&context.context_id) else {
            debug!(context_id = %context.context_id, "Context already released");
            return;
        };

        let pruned = match self.git_lock.acquire().await {
            Ok(_permit) => {
                let repo_path = self.repo_path.clone();
                let name = entry.name.clone();
                tokio::task::spawn_blocking(move || remove_worktree(&repo_path, &name))
                    .await
                    .map_err(|e| ReviewError::Internal(format!("Worktree task panicked: {}", e)))
                    .and_then(|r| r)
            }
            Err(e) => Err(e),
        };
        if let Err(e) = pruned {
            warn!(worktree = %entry.name, error = %e, "Failed to prune worktree");
        }

        for dir in [&entry.storage, &entry.state_namespace] {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dir.display(), error = %e, "Failed to remove context directory");
                }
            }
        }
        info!(worktree = %entry.name, "Worktree context released");
    }

    fn active_count(&self) -> usize {
        self.active.len()
    }

    fn provider_name(&self) -> &str {
        "worktree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        let repo = git2::Repository::init(dir).unwrap();
        std::fs::write(dir.join("lib.rs"), "fn main() {}\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("lib.rs")).unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        let sig = git2::Signature::now("crossreview", "crossreview@localhost").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
    }

    #[tokio::test]
    async fn test_worktree_checkout_and_release() {
        let repo_dir = TempDir::new().unwrap();
        let base_dir = TempDir::new().unwrap();
        init_repo(repo_dir.path());

        let provider = WorktreeProvider::new(repo_dir.path(), base_dir.path());
        let ctx = provider.acquire(&SourceId::new("opus")).await.unwrap();

        assert!(ctx.storage.join("lib.rs").is_file());
        assert!(ctx.state_namespace.is_dir());
        assert_eq!(provider.active_count(), 1);

        provider.release(&ctx).await;
        assert!(!ctx.storage.exists());
        assert_eq!(provider.active_count(), 0);
        provider.release(&ctx).await;
    }

    #[tokio::test]
    async fn test_missing_repository_is_provisioning_error() {
        let not_repo = TempDir::new().unwrap();
        let base_dir = TempDir::new().unwrap();
        let provider = WorktreeProvider::new(not_repo.path(), base_dir.path());

        let err = provider.acquire(&SourceId::new("opus")).await.unwrap_err();
        assert!(matches!(err, ReviewError::Provisioning(_)));
        assert_eq!(provider.active_count(), 0);
    }
}
