//! Scoped persistent memory — the `# Memory` system-prompt section.
//!
//! Generalizes the single long-term + daily-notes split into an arbitrary
//! set of named scopes, so the prompt builder can list them in one
//! deterministic pass instead of special-casing "long-term" and "today".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A source of named, freeform memory scopes for an agent.
///
/// `List()` returns every scope keyed by name, in whatever order the
/// implementation likes — callers that need determinism (the prompt
/// builder) get it for free from `BTreeMap`'s key ordering.
pub trait MemoryProvider: Send + Sync {
    /// All scopes currently held, keyed by scope name.
    fn list(&self) -> BTreeMap<String, String>;
}

/// File-backed memory: one scope per `*.md` file under a directory.
///
/// The file stem becomes the scope name (`MEMORY.md` → `MEMORY`,
/// `2026-07-29.md` → `2026-07-29`), and the file's full contents become the
/// scope body. Empty files are omitted from `list()`.
pub struct FileScopedMemory {
    dir: PathBuf,
}

impl FileScopedMemory {
    /// Create a provider rooted at `dir`, creating it if absent.
    pub fn new(workspace: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = workspace.as_ref().join("memory");
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    /// Create a provider without creating the directory; reads return empty.
    pub fn new_lazy(workspace: impl AsRef<Path>) -> Self {
        Self {
            dir: workspace.as_ref().join("memory"),
        }
    }

    /// Path to the memory directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite (creating if absent) the body of a named scope.
    pub fn write_scope(&self, scope: &str, body: &str) -> std::io::Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        std::fs::write(self.dir.join(format!("{scope}.md")), body)
    }

    /// Append to a named scope, creating it if absent.
    pub fn append_scope(&self, scope: &str, body: &str) -> std::io::Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(format!("{scope}.md"));
        if path.exists() {
            let mut existing = std::fs::read_to_string(&path)?;
            existing.push('\n');
            existing.push_str(body);
            std::fs::write(&path, existing)
        } else {
            std::fs::write(&path, body)
        }
    }
}

impl MemoryProvider for FileScopedMemory {
    fn list(&self) -> BTreeMap<String, String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return BTreeMap::new();
        };
        let mut scopes = BTreeMap::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(body) = std::fs::read_to_string(&path) else {
                continue;
            };
            if body.trim().is_empty() {
                continue;
            }
            scopes.insert(stem.to_string(), body);
        }
        scopes
    }
}
