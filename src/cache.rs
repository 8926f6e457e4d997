//! Keyed dependency cache.
//!
//! Cache entries live under `.cadence/cache/`, one directory per key,
//! holding a copy of the declared paths plus a metadata file. Entries are
//! immutable: saving an existing key is a no-op. Restore tries the exact
//! key first, then falls back to the most recently created entry whose key
//! starts with one of the restore-key prefixes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utc_now_iso;

const META_FILE: &str = "meta.yml";
const TREE_DIR: &str = "tree";

/// Metadata written alongside each cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub key: String,
    pub created_at: String,
    pub paths: Vec<String>,
}

/// Outcome of a restore attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The exact key was found.
    ExactHit(String),
    /// A restore-key prefix matched this stored key.
    PartialHit(String),
    Miss,
}

impl RestoreOutcome {
    pub fn is_hit(&self) -> bool {
        !matches!(self, RestoreOutcome::Miss)
    }

    /// The stored key that satisfied the restore, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            RestoreOutcome::ExactHit(k) | RestoreOutcome::PartialHit(k) => Some(k),
            RestoreOutcome::Miss => None,
        }
    }
}

/// Save `paths` (relative to `workspace`) under `key`.
///
/// Returns false when the key already exists; entries are immutable.
pub fn save(cache_dir: &Path, workspace: &Path, key: &str, paths: &[String]) -> Result<bool> {
    if key.is_empty() {
        bail!("Cache key cannot be empty");
    }
    let entry_dir = entry_dir(cache_dir, key);
    if entry_dir.exists() {
        return Ok(false);
    }

    let tree_dir = entry_dir.join(TREE_DIR);
    std::fs::create_dir_all(&tree_dir)
        .with_context(|| format!("Failed to create cache entry for '{}'", key))?;

    let mut saved_any = false;
    for rel in paths {
        let src = workspace.join(rel);
        if !src.exists() {
            continue;
        }
        let dst = tree_dir.join(rel);
        copy_tree(&src, &dst)
            .with_context(|| format!("Failed to copy '{}' into the cache", rel))?;
        saved_any = true;
    }

    if !saved_any {
        // Nothing to store; don't leave an empty poisoned entry behind.
        std::fs::remove_dir_all(&entry_dir).ok();
        return Ok(false);
    }

    let meta = CacheMeta {
        key: key.to_string(),
        created_at: utc_now_iso(),
        paths: paths.to_vec(),
    };
    let content = serde_yaml::to_string(&meta).context("Failed to serialize cache metadata")?;
    std::fs::write(entry_dir.join(META_FILE), content)?;
    Ok(true)
}

/// Restore into `workspace`: exact `key` first, then restore-key prefixes
/// (most recently created entry wins within a prefix).
pub fn restore(
    cache_dir: &Path,
    workspace: &Path,
    key: &str,
    restore_keys: &[String],
) -> Result<RestoreOutcome> {
    let entries = list(cache_dir)?;

    if let Some(meta) = entries.iter().find(|m| m.key == key) {
        restore_entry(cache_dir, workspace, meta)?;
        return Ok(RestoreOutcome::ExactHit(key.to_string()));
    }

    for prefix in restore_keys {
        let mut candidates: Vec<&CacheMeta> = entries
            .iter()
            .filter(|m| m.key.starts_with(prefix.as_str()))
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(meta) = candidates.first() {
            restore_entry(cache_dir, workspace, meta)?;
            return Ok(RestoreOutcome::PartialHit(meta.key.clone()));
        }
    }

    Ok(RestoreOutcome::Miss)
}

fn restore_entry(cache_dir: &Path, workspace: &Path, meta: &CacheMeta) -> Result<()> {
    let tree_dir = entry_dir(cache_dir, &meta.key).join(TREE_DIR);
    for rel in &meta.paths {
        let src = tree_dir.join(rel);
        if !src.exists() {
            continue;
        }
        let dst = workspace.join(rel);
        copy_tree(&src, &dst)
            .with_context(|| format!("Failed to restore '{}' from cache '{}'", rel, meta.key))?;
    }
    Ok(())
}

/// List all cache entries, newest first.
pub fn list(cache_dir: &Path) -> Result<Vec<CacheMeta>> {
    let mut entries = Vec::new();
    if !cache_dir.exists() {
        return Ok(entries);
    }
    for entry in std::fs::read_dir(cache_dir)
        .with_context(|| format!("Failed to read {}", cache_dir.display()))?
    {
        let entry = entry?;
        let meta_path = entry.path().join(META_FILE);
        if !meta_path.is_file() {
            continue;
        }
        let content = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        let meta: CacheMeta = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", meta_path.display()))?;
        entries.push(meta);
    }
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.key.cmp(&a.key)));
    Ok(entries)
}

/// Remove every cache entry. Returns how many were removed.
pub fn clear(cache_dir: &Path) -> Result<usize> {
    let entries = list(cache_dir)?;
    for meta in &entries {
        let dir = entry_dir(cache_dir, &meta.key);
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove cache entry '{}'", meta.key))?;
    }
    Ok(entries.len())
}

fn entry_dir(cache_dir: &Path, key: &str) -> PathBuf {
    cache_dir.join(sanitize_key(key))
}

/// Cache keys become directory names; anything outside a conservative
/// character set is mapped to '_'.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)
            .with_context(|| format!("Failed to copy {}", src.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace_with_deps(tmp: &TempDir) -> PathBuf {
        let ws = tmp.path().join("ws");
        fs::create_dir_all(ws.join(".venv/lib")).unwrap();
        fs::write(ws.join(".venv/lib/pkg.py"), "code").unwrap();
        ws
    }

    #[test]
    fn test_save_and_exact_restore() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_with_deps(&tmp);
        let cache = tmp.path().join("cache");

        let saved = save(&cache, &ws, "deps-abc123", &[".venv".to_string()]).unwrap();
        assert!(saved);

        let fresh = tmp.path().join("fresh");
        fs::create_dir_all(&fresh).unwrap();
        let outcome = restore(&cache, &fresh, "deps-abc123", &[]).unwrap();
        assert_eq!(outcome, RestoreOutcome::ExactHit("deps-abc123".to_string()));
        assert_eq!(
            fs::read_to_string(fresh.join(".venv/lib/pkg.py")).unwrap(),
            "code"
        );
    }

    #[test]
    fn test_save_existing_key_is_noop() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_with_deps(&tmp);
        let cache = tmp.path().join("cache");

        assert!(save(&cache, &ws, "deps-abc123", &[".venv".to_string()]).unwrap());
        // Change the workspace, then try to save again under the same key.
        fs::write(ws.join(".venv/lib/pkg.py"), "changed").unwrap();
        assert!(!save(&cache, &ws, "deps-abc123", &[".venv".to_string()]).unwrap());

        let fresh = tmp.path().join("fresh");
        fs::create_dir_all(&fresh).unwrap();
        restore(&cache, &fresh, "deps-abc123", &[]).unwrap();
        assert_eq!(
            fs::read_to_string(fresh.join(".venv/lib/pkg.py")).unwrap(),
            "code"
        );
    }

    #[test]
    fn test_restore_key_prefix_fallback() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_with_deps(&tmp);
        let cache = tmp.path().join("cache");

        save(&cache, &ws, "deps-old111", &[".venv".to_string()]).unwrap();

        let fresh = tmp.path().join("fresh");
        fs::create_dir_all(&fresh).unwrap();
        let outcome = restore(
            &cache,
            &fresh,
            "deps-new222",
            &["deps-".to_string()],
        )
        .unwrap();
        assert_eq!(outcome, RestoreOutcome::PartialHit("deps-old111".to_string()));
        assert!(fresh.join(".venv/lib/pkg.py").exists());
    }

    #[test]
    fn test_restore_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let outcome = restore(&cache, tmp.path(), "deps-x", &["other-".to_string()]).unwrap();
        assert_eq!(outcome, RestoreOutcome::Miss);
        assert!(!outcome.is_hit());
    }

    #[test]
    fn test_save_missing_paths_stores_nothing() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path().join("ws");
        fs::create_dir_all(&ws).unwrap();
        let cache = tmp.path().join("cache");

        let saved = save(&cache, &ws, "deps-abc", &["node_modules".to_string()]).unwrap();
        assert!(!saved);
        assert!(list(&cache).unwrap().is_empty());
    }

    #[test]
    fn test_list_and_clear() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_with_deps(&tmp);
        let cache = tmp.path().join("cache");

        save(&cache, &ws, "a-key", &[".venv".to_string()]).unwrap();
        save(&cache, &ws, "b-key", &[".venv".to_string()]).unwrap();

        assert_eq!(list(&cache).unwrap().len(), 2);
        assert_eq!(clear(&cache).unwrap(), 2);
        assert!(list(&cache).unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("deps-3.10_x"), "deps-3.10_x");
        assert_eq!(sanitize_key("a/b:c"), "a_b_c");
    }
}
