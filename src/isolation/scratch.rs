use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::context::{new_context_id, sanitize_label, IsolationContext, IsolationProvider};
use crate::errors::ReviewError;
use crate::models::finding::SourceId;

const MAX_ALLOCATION_ATTEMPTS: u32 = 4;

/// Hands out a private directory pair per context under a base directory.
pub struct ScratchProvider {
    base_dir: PathBuf,
    /// Tree copied into every fresh working copy.
    seed: Option<PathBuf>,
    active: DashMap<String, PathBuf>,
}

impl ScratchProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            seed: None,
            active: DashMap::new(),
        }
    }

    pub fn with_seed(mut self, seed: impl Into<PathBuf>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl IsolationProvider for ScratchProvider {
    async fn acquire(&self, label: &SourceId) -> Result<IsolationContext, ReviewError> {
        tokio::fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            ReviewError::Provisioning(format!(
                "Failed to create base directory {}: {}",
                self.base_dir.display(),
                e
            ))
        })?;

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let (context_id, short) = new_context_id();
            let root = self.base_dir.join(format!("{}-{}", sanitize_label(label.as_str()), short));

            // create_dir (not create_dir_all) fails on an existing root, so two
            // concurrent acquisitions can never end up sharing one.
            match tokio::fs::create_dir(&root).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(root = %root.display(), "Context root collision, retrying");
                    continue;
                }
                Err(e) => {
                    return Err(ReviewError::Provisioning(format!(
                        "Failed to create context root {}: {}",
                        root.display(),
                        e
                    )));
                }
            }

            let storage = root.join("work");
            let state_namespace = root.join("state");
            for dir in [&storage, &state_namespace] {
                if let Err(e) = tokio::fs::create_dir(dir).await {
                    let _ = tokio::fs::remove_dir_all(&root).await;
                    return Err(ReviewError::Provisioning(format!(
                        "Failed to create {}: {}",
                        dir.display(),
                        e
                    )));
                }
            }

            if let Some(seed) = &self.seed {
                let (src, dst, skip) = (seed.clone(), storage.clone(), self.base_dir.clone());
                let copied = tokio::task::spawn_blocking(move || copy_tree(&src, &dst, &skip))
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))
                    .and_then(|r| r);
                if let Err(e) = copied {
                    let _ = tokio::fs::remove_dir_all(&root).await;
                    return Err(ReviewError::Provisioning(format!(
                        "Failed to seed working copy from {}: {}",
                        seed.display(),
                        e
                    )));
                }
            }

            self.active.insert(context_id.clone(), root);
            info!(label = %label, context_id = %context_id, "Scratch context acquired");
            return Ok(IsolationContext {
                context_id,
                label: label.clone(),
                storage,
                state_namespace,
            });
        }

        Err(ReviewError::Provisioning(format!(
            "Could not allocate a unique context for {} after {} attempts",
            label, MAX_ALLOCATION_ATTEMPTS
        )))
    }

    async fn release(&self, context: &IsolationContext) {
        let Some((_, root)) = self.active.remove(&context.context_id) else {
            debug!(context_id = %context.context_id, "Context already released");
            return;
        };
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => info!(context_id = %context.context_id, "Scratch context released"),
            Err(e) => warn!(
                context_id = %context.context_id,
                root = %root.display(),
                error = %e,
                "Failed to remove scratch context"
            ),
        }
    }

    fn active_count(&self) -> usize {
        self.active.len()
    }

    fn provider_name(&self) -> &str {
        "scratch"
    }
}

const SKIP_DIRS: [&str; 4] = [".git", "target", "node_modules", ".crossreview"];

fn copy_tree(src: &Path, dst: &Path, skip: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if path == skip || SKIP_DIRS.iter().any(|d| name == *d) {
            continue;
        }
        let target = dst.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            std::fs::create_dir(&target)?;
            copy_tree(&path, &target, skip)?;
        } else if file_type.is_file() {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}
