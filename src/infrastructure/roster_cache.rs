use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::domain::entity::{RosterSnapshot, SnapshotSource};
use crate::infrastructure::config::RosterSourceConfig;

/// CachedRoster はキャッシュディレクトリ内で最も新しい名簿ファイル。
#[derive(Debug, Clone)]
pub struct CachedRoster {
    pub path: PathBuf,
    pub age: Duration,
}

/// RosterCache はローカルの名簿キャッシュファイル（既定 `roster_*.json`）を扱う。
/// ファイルは学校ごとのサブディレクトリ `<dir>/<school_id>/` に置く。
/// 読み書きの失敗はログに残して呼び出し側には None / Err で伝える。
pub struct RosterCache {
    dir: PathBuf,
    pattern: String,
    max_age: Duration,
}

impl RosterCache {
    pub fn new(dir: impl Into<PathBuf>, pattern: impl Into<String>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            pattern: pattern.into(),
            max_age,
        }
    }

    pub fn from_config(config: &RosterSourceConfig) -> Self {
        Self::new(&config.cache_dir, &config.cache_pattern, config.cache_max_age())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 学校のキャッシュディレクトリ。パス区切り等は `_` に置き換える。
    pub fn school_dir(&self, school_id: &str) -> PathBuf {
        let segment: String = school_id
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if segment.is_empty() {
            self.dir.join("_")
        } else {
            self.dir.join(segment)
        }
    }

    /// 学校の最も新しいキャッシュファイルを返す。
    /// ディレクトリ走査はブロッキングなので spawn_blocking で実行する。
    pub async fn latest(&self, school_id: &str) -> Option<CachedRoster> {
        let dir = self.school_dir(school_id);
        let pattern = format!("{}/{}", glob::Pattern::escape(&dir.to_string_lossy()), self.pattern);
        match tokio::task::spawn_blocking(move || scan_latest(&pattern)).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "roster cache scan task failed");
                None
            }
        }
    }

    pub fn is_fresh(&self, cached: &CachedRoster) -> bool {
        cached.age < self.max_age
    }

    /// キャッシュファイルを読み込む。鮮度切れなら stale フラグを立てる。
    pub async fn load(&self, cached: &CachedRoster) -> anyhow::Result<RosterSnapshot> {
        let bytes = tokio::fs::read(&cached.path).await?;
        let mut snapshot = RosterSnapshot::from_slice(&bytes)?;
        snapshot.metadata.source = SnapshotSource::Cache;
        snapshot.metadata.stale = !self.is_fresh(cached);
        Ok(snapshot)
    }

    /// スナップショットを学校の新しいキャッシュファイルとして書き出す。
    pub async fn store(&self, school_id: &str, snapshot: &RosterSnapshot) -> anyhow::Result<PathBuf> {
        let dir = self.school_dir(school_id);
        tokio::fs::create_dir_all(&dir).await?;
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
        let file_name = if self.pattern.contains('*') {
            self.pattern.replacen('*', &stamp, 1)
        } else {
            format!("roster_{}.json", stamp)
        };
        let path = dir.join(file_name);
        let body = serde_json::to_vec_pretty(&snapshot.to_json()?)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

fn scan_latest(pattern: &str) -> Option<CachedRoster> {
    let entries = match glob::glob(pattern) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid roster cache pattern");
            return None;
        }
    };

    let now = SystemTime::now();
    entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read roster cache entry");
                None
            }
        })
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, modified)| CachedRoster {
            path,
            age: now.duration_since(modified).unwrap_or_default(),
        })
}
