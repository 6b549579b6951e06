pub mod context;
pub mod scratch;
pub mod semaphore;
pub mod worktree;

use std::sync::Arc;

use crate::config::{IsolationConfig, IsolationKind};

pub use context::{IsolationContext, IsolationProvider};
pub use scratch::ScratchProvider;
pub use semaphore::GitSemaphore;
pub use worktree::WorktreeProvider;

/// Provider for the configured isolation strategy. Scratch contexts are
/// seeded with a copy of the repository so engines see the same tree.
pub fn create_provider(config: &IsolationConfig) -> Arc<dyn IsolationProvider> {
    match config.kind {
        IsolationKind::Worktree => Arc::new(WorktreeProvider::new(config.repo_path(), config.base_path())),
        IsolationKind::Scratch => {
            Arc::new(ScratchProvider::new(config.base_path()).with_seed(config.repo_path()))
        }
    }
}
