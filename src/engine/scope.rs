use std::path::{Component, Path, PathBuf};

use crate::errors::EngineError;

const EXCLUDE_DIRS: [&str; 8] = [".git", "node_modules", "vendor", "dist", "build", "__pycache__", ".venv", "target"];
const CODE_EXTENSIONS: [&str; 24] = [
    "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "php", "rb", "cs", "c", "cpp", "h", "hpp", "sql",
    "yaml", "yml", "json", "toml", "md", "sh", "kt", "swift",
];
const MAX_FILE_SIZE: u64 = 500_000;

/// Default budget of source text embedded into a single prompt.
pub const DEFAULT_SCOPE_BYTES: usize = 120_000;

/// Reads the source text of a scope from inside a working copy, for engines
/// that cannot browse the filesystem themselves.
#[derive(Debug, Clone)]
pub struct ScopeReader {
    max_bytes: usize,
}

impl ScopeReader {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn read(&self, root: &Path, scope: &str) -> Result<String, EngineError> {
        let target = resolve(root, scope)?;
        let mut files = Vec::new();
        if target.is_file() {
            files.push(target.clone());
        } else if target.is_dir() {
            walk_dir(&target, &mut files)
                .map_err(|e| EngineError::crash(format!("Failed to read scope {}: {}", scope, e)))?;
        } else {
            return Err(EngineError::crash(format!("Scope {} not found in working copy", scope)));
        }
        files.sort();

        let mut out = String::new();
        let mut omitted = 0usize;
        for path in &files {
            let Ok(content) = std::fs::read_to_string(path) else { continue };
            let rel = path.strip_prefix(root).unwrap_or(path).display().to_string();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let chunk = format!("### File: {}\n```{}\n{}\n```\n\n", rel, ext, content);
            if out.len() + chunk.len() > self.max_bytes {
                omitted += 1;
                continue;
            }
            out.push_str(&chunk);
        }
        if omitted > 0 {
            out.push_str(&format!("[{} more files omitted]\n", omitted));
        }
        Ok(out)
    }
}

impl Default for ScopeReader {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE_BYTES)
    }
}

fn resolve(root: &Path, scope: &str) -> Result<PathBuf, EngineError> {
    let rel = Path::new(scope.trim());
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(EngineError::crash(format!("Scope {} escapes the working copy", scope)));
    }
    Ok(root.join(rel))
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if EXCLUDE_DIRS.contains(&name) {
            continue;
        }

        if path.is_dir() {
            walk_dir(&path, files)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if CODE_EXTENSIONS.contains(&ext) {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size < MAX_FILE_SIZE {
                    files.push(path);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_directory_in_path_order() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/target")).unwrap();
        std::fs::write(dir.path().join("src/b.rs"), "fn b() {}").unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("src/target/skip.rs"), "fn skip() {}").unwrap();
        std::fs::write(dir.path().join("src/image.png"), "binary").unwrap();

        let text = ScopeReader::default().read(dir.path(), "src").unwrap();
        let a = text.find("src/a.rs").unwrap();
        let b = text.find("src/b.rs").unwrap();
        assert!(a < b);
        assert!(!text.contains("skip"));
        assert!(!text.contains("image.png"));
    }

    #[test]
    fn test_single_file_scope() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('x')").unwrap();
        let text = ScopeReader::default().read(dir.path(), "main.py").unwrap();
        assert!(text.starts_with("### File: main.py\n```py\n"));
    }

    #[test]
    fn test_budget_omits_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "a".repeat(80)).unwrap();
        std::fs::write(dir.path().join("b.rs"), "b".repeat(80)).unwrap();
        let text = ScopeReader::new(120).read(dir.path(), ".").unwrap();
        assert!(text.contains("a.rs"));
        assert!(text.contains("[1 more files omitted]"));
    }

    #[test]
    fn test_rejects_escaping_scope() {
        let dir = TempDir::new().unwrap();
        assert!(ScopeReader::default().read(dir.path(), "../etc").is_err());
        assert!(ScopeReader::default().read(dir.path(), "missing").is_err());
    }
}
