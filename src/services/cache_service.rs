//! Repository model cache
//!
//! The cache lives at `<working folder>/.git/gitmind.cache`. Layout:
//!
//! ```text
//! magic    8 bytes  "GMCACHE1"
//! version  u32 LE   schema version, must equal CURRENT_VERSION
//! length   u64 LE   payload byte count
//! payload           time stamp, current branch, commit id table,
//!                   commits, branches, merges
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8, lists a `u32` count
//! followed by the items. Commit ids are stored once in the id table and
//! referenced everywhere else by their `u32` table index.
//!
//! Writes go to a `.tmp.<uuid>` sibling first and are renamed into place,
//! so the cache file is never observed half written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{GitMindError, Result};
use crate::models::{CommitIdTable, MBranch, MCommit, MMerge, MRepository, CURRENT_VERSION};

pub const CACHE_FILE_NAME: &str = "gitmind.cache";
const TEMP_MARKER: &str = ".tmp.";
const MAGIC: &[u8; 8] = b"GMCACHE1";
const HEADER_LENGTH: usize = 8 + 4 + 8;

const BRANCH_REMOTE: u8 = 0b01;
const BRANCH_CURRENT: u8 = 0b10;

/// Location of the cache file for a working folder
pub fn cache_path(working_folder: &Path) -> PathBuf {
    working_folder.join(".git").join(CACHE_FILE_NAME)
}

fn temp_path(cache_file: &Path) -> PathBuf {
    let mut name = cache_file.as_os_str().to_os_string();
    name.push(format!("{}{}", TEMP_MARKER, uuid::Uuid::new_v4()));
    PathBuf::from(name)
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn count(&mut self, count: usize) -> Result<()> {
        let count = u32::try_from(count).map_err(|_| {
            GitMindError::CacheFormat(format!("length {} does not fit in u32", count))
        })?;
        self.u32(count);
        Ok(())
    }

    fn str(&mut self, value: &str) -> Result<()> {
        self.count(value.len())?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn opt_str(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => {
                self.u8(1);
                self.str(v)
            }
            None => {
                self.u8(0);
                Ok(())
            }
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| GitMindError::CacheFormat("unexpected end of data".to_string()))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(self.u64()? as i64)
    }

    /// A list count, capped for allocation by the bytes left
    fn count(&mut self) -> Result<(usize, usize)> {
        let count = self.u32()? as usize;
        let remaining = self.buf.len() - self.pos;
        Ok((count, count.min(remaining)))
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| GitMindError::CacheFormat("invalid UTF-8 string".to_string()))
    }

    fn opt_str(&mut self) -> Result<Option<String>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.str()?)),
            flag => Err(GitMindError::CacheFormat(format!(
                "invalid option flag {}",
                flag
            ))),
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

fn resolve_id(table: &CommitIdTable, index: u32) -> Result<String> {
    table
        .resolve(index)
        .map(str::to_string)
        .ok_or_else(|| GitMindError::CacheFormat(format!("unknown commit id index {}", index)))
}

/// Serialize a repository model
pub fn encode_repository(repo: &MRepository) -> Result<Vec<u8>> {
    let mut table = CommitIdTable::new();
    for commit in &repo.commits {
        table.intern(&commit.id);
        for parent in &commit.parent_ids {
            table.intern(parent);
        }
    }
    for branch in &repo.branches {
        table.intern(&branch.tip_id);
    }
    for merge in &repo.merges {
        table.intern(&merge.commit_id);
        table.intern(&merge.merged_parent_id);
    }

    let mut w = Writer::default();
    w.i64(repo.time_stamp.timestamp_millis());
    w.opt_str(repo.current_branch.as_deref())?;

    w.count(table.len())?;
    for id in table.ids() {
        w.str(id)?;
    }

    w.count(repo.commits.len())?;
    for commit in &repo.commits {
        w.u32(table.intern(&commit.id));
        w.count(commit.parent_ids.len())?;
        for parent in &commit.parent_ids {
            w.u32(table.intern(parent));
        }
        w.str(&commit.subject)?;
        w.str(&commit.author)?;
        w.i64(commit.author_date);
        w.opt_str(commit.branch_name.as_deref())?;
    }

    w.count(repo.branches.len())?;
    for branch in &repo.branches {
        w.str(&branch.name)?;
        w.u32(table.intern(&branch.tip_id));
        let mut flags = 0;
        if branch.is_remote {
            flags |= BRANCH_REMOTE;
        }
        if branch.is_current {
            flags |= BRANCH_CURRENT;
        }
        w.u8(flags);
    }

    w.count(repo.merges.len())?;
    for merge in &repo.merges {
        w.u32(table.intern(&merge.commit_id));
        w.u32(table.intern(&merge.merged_parent_id));
    }

    let payload = w.buf;
    let mut out = Vec::with_capacity(HEADER_LENGTH + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&repo.version.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Deserialize a repository model.
///
/// The result has no working folder yet; call
/// [`MRepository::complete_deserialization`] before use.
pub fn decode_repository(bytes: &[u8], expected_version: u32) -> Result<MRepository> {
    let mut header = Reader::new(bytes);
    if header.take(MAGIC.len())? != MAGIC {
        return Err(GitMindError::CacheFormat("not a GitMind cache".to_string()));
    }
    let version = header.u32()?;
    if version != expected_version {
        return Err(GitMindError::CacheVersion {
            found: version,
            expected: expected_version,
        });
    }
    let length = header.u64()? as usize;
    let payload = header.take(length)?;
    if !header.is_at_end() {
        return Err(GitMindError::CacheFormat("trailing data".to_string()));
    }

    let mut r = Reader::new(payload);
    let mut repo = MRepository::new(Path::new(""));
    repo.version = version;
    repo.time_stamp = Utc
        .timestamp_millis_opt(r.i64()?)
        .single()
        .unwrap_or_else(Utc::now);
    repo.current_branch = r.opt_str()?;

    let (count, capacity) = r.count()?;
    let mut ids = Vec::with_capacity(capacity);
    for _ in 0..count {
        ids.push(r.str()?);
    }
    let table = CommitIdTable::from_ids(ids);

    let (count, capacity) = r.count()?;
    repo.commits.reserve(capacity);
    for _ in 0..count {
        let id = resolve_id(&table, r.u32()?)?;
        let (parent_count, parent_capacity) = r.count()?;
        let mut parent_ids = Vec::with_capacity(parent_capacity);
        for _ in 0..parent_count {
            parent_ids.push(resolve_id(&table, r.u32()?)?);
        }
        repo.commits.push(MCommit {
            id,
            parent_ids,
            subject: r.str()?,
            author: r.str()?,
            author_date: r.i64()?,
            branch_name: r.opt_str()?,
        });
    }

    let (count, capacity) = r.count()?;
    repo.branches.reserve(capacity);
    for _ in 0..count {
        let name = r.str()?;
        let tip_id = resolve_id(&table, r.u32()?)?;
        let flags = r.u8()?;
        repo.branches.push(MBranch {
            name,
            tip_id,
            is_remote: flags & BRANCH_REMOTE != 0,
            is_current: flags & BRANCH_CURRENT != 0,
        });
    }

    let (count, capacity) = r.count()?;
    repo.merges.reserve(capacity);
    for _ in 0..count {
        repo.merges.push(MMerge {
            commit_id: resolve_id(&table, r.u32()?)?,
            merged_parent_id: resolve_id(&table, r.u32()?)?,
        });
    }

    if !r.is_at_end() {
        return Err(GitMindError::CacheFormat("trailing payload data".to_string()));
    }

    Ok(repo)
}

/// Reads and writes the repository cache, one operation at a time
#[derive(Clone, Default)]
pub struct CacheService {
    lock: Arc<Mutex<()>>,
}

impl CacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist `repo` to the cache of its working folder
    pub async fn cache(&self, repo: &MRepository) -> Result<()> {
        let path = cache_path(repo.working_folder());
        let bytes = encode_repository(repo)?;

        {
            let _guard = self.lock.lock().await;
            let temp = temp_path(&path);

            if let Err(e) = tokio::fs::write(&temp, &bytes).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e.into());
            }

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                // Moved aside, removed by the sweep below
                tokio::fs::rename(&path, temp_path(&path)).await?;
            }
            tokio::fs::rename(&temp, &path).await?;
        }

        tracing::info!(
            "Cached {} commits for {}",
            repo.commit_count(),
            repo.working_folder().display()
        );

        self.spawn_sweep(repo.working_folder());
        Ok(())
    }

    /// Load the cached model, or None when missing, corrupt or outdated
    pub async fn try_get_repository(&self, working_folder: &Path) -> Option<MRepository> {
        let path = cache_path(working_folder);
        let _guard = self.lock.lock().await;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cache at {}", path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read cache {}: {}", path.display(), e);
                return None;
            }
        };

        match decode_repository(&bytes, CURRENT_VERSION) {
            Ok(mut repo) => {
                repo.complete_deserialization(working_folder);
                tracing::debug!(
                    "Loaded {} cached commits for {}",
                    repo.commit_count(),
                    working_folder.display()
                );
                Some(repo)
            }
            Err(GitMindError::CacheVersion { found, expected }) => {
                tracing::info!(
                    "Ignoring cache version {} (expected {}) for {}",
                    found,
                    expected,
                    working_folder.display()
                );
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Invalidate the cache by moving it aside; the file itself is removed
    /// by a later sweep.
    pub async fn try_delete_cache(&self, working_folder: &Path) -> bool {
        let path = cache_path(working_folder);
        let _guard = self.lock.lock().await;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return false;
        }

        match tokio::fs::rename(&path, temp_path(&path)).await {
            Ok(()) => {
                tracing::info!("Invalidated cache for {}", working_folder.display());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to invalidate cache {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete leftover temp files next to the cache. Returns how many were
    /// removed; files that cannot be deleted are left for the next sweep.
    pub async fn sweep_temp_files(&self, working_folder: &Path) -> usize {
        let path = cache_path(working_folder);
        let Some(folder) = path.parent() else {
            return 0;
        };
        let prefix = format!("{}{}", CACHE_FILE_NAME, TEMP_MARKER);

        let _guard = self.lock.lock().await;
        let mut entries = match tokio::fs::read_dir(folder).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to list {}: {}", folder.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", entry.path().display(), e)
                }
            }
        }
        removed
    }

    fn spawn_sweep(&self, working_folder: &Path) -> JoinHandle<usize> {
        let service = self.clone();
        let folder = working_folder.to_path_buf();
        tokio::spawn(async move { service.sweep_temp_files(&folder).await })
    }
}
