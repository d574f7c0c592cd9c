//! Notebook vault: scoped markdown I/O with frontmatter and daily logs.
//!
//! All paths resolve inside the configured vault root; names must not escape
//! it. Writes go through a temp file + rename so readers never observe torn
//! content, and writes to the same filename are serialized by a per-path
//! lock while different files proceed in parallel.

mod frontmatter;

pub use frontmatter::{FmValue, Frontmatter, FrontmatterError};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::clock::utc_today;
use crate::error::{HubError, HubResult};

/// Ordering for `list`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOrder {
    Newest,
    Oldest,
}

/// One vault file as seen by `list` and `search`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct NoteInfo {
    pub name: String,
    pub size: u64,
    pub modified_at: String,
}

/// Filesystem-backed notebook vault.
pub struct NotebookVault {
    root: PathBuf,
    logs_folder: String,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Bound on how many bytes of each file `search` will scan when matching on
/// content.
const SEARCH_BODY_SCAN_CAP: u64 = 256 * 1024;

impl NotebookVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            logs_folder: String::new(),
            locks: DashMap::new(),
        }
    }

    /// Daily log files go under `folder` relative to the vault root.
    pub fn with_logs_folder(mut self, folder: impl Into<String>) -> Self {
        self.logs_folder = folder.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the vault root when missing and verifies it is writable.
    /// Governance uses this as its pre-check.
    pub async fn ensure_root(&self) -> HubResult<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            HubError::GovernanceBlocked(format!(
                "vault root {} is not writable: {}",
                self.root.display(),
                e
            ))
        })?;
        let probe = self.root.join(".vault-probe");
        tokio::fs::write(&probe, b"ok").await.map_err(|e| {
            HubError::GovernanceBlocked(format!(
                "vault root {} is not writable: {}",
                self.root.display(),
                e
            ))
        })?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(self.root.clone())
    }

    /// Resolves a note name inside the vault. Rejects traversal and absolute
    /// paths; appends `.md` when missing.
    fn resolve(&self, name: &str) -> HubResult<PathBuf> {
        if name.is_empty() {
            return Err(HubError::InvalidInput("note name must not be empty".into()));
        }
        let candidate = Path::new(name);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(HubError::InvalidInput(format!(
                "note name escapes the vault: {}",
                name
            )));
        }
        let mut path = self.root.join(candidate);
        if path.extension().is_none() {
            path.set_extension("md");
        }
        Ok(path)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path.to_string_lossy().to_string();
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> HubResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Replaces file contents, prepending a frontmatter block when given.
    pub async fn write(
        &self,
        name: &str,
        body: &str,
        frontmatter: Option<&Frontmatter>,
    ) -> HubResult<PathBuf> {
        let path = self.resolve(name)?;
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        let content = match frontmatter {
            Some(fm) if !fm.is_empty() => format!("{}\n{}", fm.to_block(), body),
            _ => body.to_string(),
        };
        self.write_atomic(&path, &content).await?;
        Ok(path)
    }

    /// Appends with a blank-line separator; creates the file when missing.
    pub async fn append(&self, name: &str, body: &str) -> HubResult<PathBuf> {
        let path = self.resolve(name)?;
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let content = if existing.is_empty() {
            body.to_string()
        } else {
            format!("{}\n\n{}", existing.trim_end_matches('\n'), body)
        };
        self.write_atomic(&path, &content).await?;
        Ok(path)
    }

    /// Reads a note, splitting frontmatter from the body.
    pub async fn read(&self, name: &str) -> HubResult<(Frontmatter, String)> {
        let path = self.resolve(name)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HubError::NotFound(format!("note {}", name)));
            }
            Err(e) => return Err(e.into()),
        };
        Frontmatter::parse_document(&text)
            .map_err(|e| HubError::Internal(format!("frontmatter in {}: {}", name, e)))
    }

    /// Lists vault markdown files ordered by modification time.
    pub async fn list(&self, limit: usize, order: ListOrder) -> HubResult<Vec<NoteInfo>> {
        let mut notes = self.scan().await?;
        notes.sort_by(|a, b| match order {
            ListOrder::Newest => b.modified_at.cmp(&a.modified_at),
            ListOrder::Oldest => a.modified_at.cmp(&b.modified_at),
        });
        notes.truncate(limit);
        Ok(notes)
    }

    /// Matches on filename; with `search_body`, also on content (bounded
    /// scan per file). Case-insensitive.
    pub async fn search(&self, query: &str, search_body: bool) -> HubResult<Vec<NoteInfo>> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for note in self.scan().await? {
            if note.name.to_lowercase().contains(&needle) {
                hits.push(note);
                continue;
            }
            if search_body && note.size <= SEARCH_BODY_SCAN_CAP {
                let path = self.root.join(&note.name);
                if let Ok(text) = tokio::fs::read_to_string(&path).await {
                    if text.to_lowercase().contains(&needle) {
                        hits.push(note);
                    }
                }
            }
        }
        Ok(hits)
    }

    async fn scan(&self) -> HubResult<Vec<NoteInfo>> {
        let mut notes = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let name = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();
                let modified_at = meta
                    .modified()
                    .ok()
                    .map(|t| {
                        chrono::DateTime::<chrono::Utc>::from(t)
                            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
                    })
                    .unwrap_or_default();
                notes.push(NoteInfo {
                    name,
                    size: meta.len(),
                    modified_at,
                });
            }
        }
        Ok(notes)
    }

    /// Name of today's daily log file, relative to the vault root.
    pub fn daily_log_name(&self) -> String {
        let file = format!("Log_Global_{}.md", utc_today());
        if self.logs_folder.is_empty() {
            file
        } else {
            format!("{}/{}", self.logs_folder, file)
        }
    }

    /// Appends one rendered record block to today's log, creating the file
    /// with its frontmatter header when absent.
    pub async fn append_daily_log(&self, block: &str, version: &str) -> HubResult<PathBuf> {
        let name = self.daily_log_name();
        let path = self.resolve(&name)?;
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let content = if existing.is_empty() {
            let mut fm = Frontmatter::new();
            fm.insert("date", utc_today());
            fm.insert("cli", "all-clients");
            fm.insert("version", version);
            format!("{}\n{}", fm.to_block(), block)
        } else {
            format!("{}\n\n{}", existing.trim_end_matches('\n'), block)
        };
        self.write_atomic(&path, &content).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> (tempfile::TempDir, NotebookVault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = NotebookVault::new(dir.path());
        (dir, vault)
    }

    /// **Scenario**: write then read round-trips frontmatter and body.
    #[tokio::test]
    async fn write_read_round_trip() {
        let (_dir, vault) = vault();
        let mut fm = Frontmatter::new();
        fm.insert("title", "Test");
        vault.write("note", "Body text", Some(&fm)).await.unwrap();
        let (read_fm, body) = vault.read("note").await.unwrap();
        assert_eq!(read_fm.get_str("title"), Some("Test"));
        assert!(body.contains("Body text"));
    }

    /// **Scenario**: append separates chunks with a blank line and creates
    /// missing files.
    #[tokio::test]
    async fn append_behavior() {
        let (_dir, vault) = vault();
        vault.append("log", "first").await.unwrap();
        vault.append("log", "second").await.unwrap();
        let (_, body) = vault.read("log").await.unwrap();
        assert_eq!(body, "first\n\nsecond");
    }

    /// **Scenario**: missing notes yield NotFound.
    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (_dir, vault) = vault();
        let err = vault.read("ghost").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    /// **Scenario**: names cannot escape the vault root.
    #[tokio::test]
    async fn traversal_rejected() {
        let (_dir, vault) = vault();
        assert!(vault.write("../outside", "x", None).await.is_err());
        assert!(vault.read("/etc/passwd").await.is_err());
    }

    /// **Scenario**: list orders by modification time and honors the limit.
    #[tokio::test]
    async fn list_and_search() {
        let (_dir, vault) = vault();
        vault.write("alpha", "has needle inside", None).await.unwrap();
        vault.write("beta", "nothing", None).await.unwrap();
        let all = vault.list(10, ListOrder::Oldest).await.unwrap();
        assert_eq!(all.len(), 2);
        let one = vault.list(1, ListOrder::Newest).await.unwrap();
        assert_eq!(one.len(), 1);

        let by_name = vault.search("alp", false).await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "alpha.md");

        let by_body = vault.search("needle", true).await.unwrap();
        assert_eq!(by_body.len(), 1);
        let no_body_scan = vault.search("needle", false).await.unwrap();
        assert!(no_body_scan.is_empty());
    }

    /// **Scenario**: first daily-log append creates the header; later appends
    /// only add blocks.
    #[tokio::test]
    async fn daily_log_lifecycle() {
        let (_dir, vault) = vault();
        vault
            .append_daily_log("### [t1] A :: X\nbody", "0.1.0")
            .await
            .unwrap();
        vault
            .append_daily_log("### [t2] B :: Y\nbody", "0.1.0")
            .await
            .unwrap();
        let name = vault.daily_log_name();
        let (fm, body) = vault.read(&name).await.unwrap();
        assert_eq!(fm.get_str("cli"), Some("all-clients"));
        assert_eq!(fm.get_str("version"), Some("0.1.0"));
        assert_eq!(body.matches("### [").count(), 2);
    }

    /// **Scenario**: concurrent appends to one file never tear; every chunk
    /// survives.
    #[tokio::test]
    async fn concurrent_appends_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let vault = std::sync::Arc::new(NotebookVault::new(dir.path()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                vault.append("shared", &format!("chunk-{}", i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let (_, body) = vault.read("shared").await.unwrap();
        for i in 0..8 {
            assert!(body.contains(&format!("chunk-{}", i)), "{}", body);
        }
    }

    /// **Scenario**: ensure_root creates the directory; a file in the way
    /// blocks.
    #[tokio::test]
    async fn ensure_root_pre_check() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("vault/deep");
        let vault = NotebookVault::new(&nested);
        vault.ensure_root().await.unwrap();
        assert!(nested.is_dir());

        let blocked_path = dir.path().join("blocked");
        std::fs::write(&blocked_path, b"file in the way").unwrap();
        let blocked = NotebookVault::new(&blocked_path);
        let err = blocked.ensure_root().await.unwrap_err();
        assert_eq!(err.kind(), "governance_blocked");
    }
}
