use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::entity::{RosterSnapshot, SnapshotSource};
use crate::infrastructure::roster_cache::RosterCache;
use crate::infrastructure::roster_client::RosterSourceClient;

/// SourceError は名簿取得の全経路が尽きた場合のエラー。
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("roster source unavailable: {0}")]
    Unavailable(String),
}

/// ResolveRosterUseCase は学校の名簿スナップショットを
/// 新鮮なキャッシュ → 外部名簿システム → 期限切れキャッシュの順に解決する。
/// キャッシュは学校単位で、他校のファイルは参照しない。
pub struct ResolveRosterUseCase {
    client: Arc<dyn RosterSourceClient>,
    cache: RosterCache,
}

impl ResolveRosterUseCase {
    pub fn new(client: Arc<dyn RosterSourceClient>, cache: RosterCache) -> Self {
        Self { client, cache }
    }

    pub async fn fetch_roster(&self, token: &str, school_id: &str) -> Result<RosterSnapshot, SourceError> {
        let cached = self.cache.latest(school_id).await;
        let mut fallback = None;

        if let Some(entry) = cached {
            if self.cache.is_fresh(&entry) {
                match self.cache.load(&entry).await {
                    Ok(snapshot) => {
                        info!(
                            school_id = %school_id,
                            path = %entry.path.display(),
                            classes = snapshot.classes.len(),
                            "using cached roster"
                        );
                        return Ok(snapshot);
                    }
                    Err(e) => {
                        warn!(path = %entry.path.display(), error = %e, "cached roster unreadable");
                    }
                }
            } else {
                fallback = Some(entry);
            }
        }

        match self.client.fetch_roster(token).await {
            Ok(mut snapshot) if !snapshot.is_empty() => {
                snapshot.metadata.source = SnapshotSource::Remote;
                snapshot.metadata.stale = false;
                match self.cache.store(school_id, &snapshot).await {
                    Ok(path) => info!(path = %path.display(), "roster cached"),
                    Err(e) => warn!(error = %e, "failed to write roster cache"),
                }
                info!(
                    school_id = %school_id,
                    classes = snapshot.classes.len(),
                    students = snapshot.student_count(),
                    "fetched roster from external system"
                );
                Ok(snapshot)
            }
            Ok(snapshot) => {
                let message = snapshot
                    .metadata
                    .message
                    .unwrap_or_else(|| "external roster system returned no classes".to_string());
                warn!(message = %message, "roster snapshot has metadata only");
                let mut empty = RosterSnapshot::empty(message);
                empty.metadata.version = snapshot.metadata.version;
                Ok(empty)
            }
            Err(e) => {
                warn!(error = %e, "external roster system request failed");
                if let Some(entry) = fallback {
                    match self.cache.load(&entry).await {
                        Ok(snapshot) => {
                            warn!(
                                path = %entry.path.display(),
                                age_secs = entry.age.as_secs(),
                                "falling back to stale roster cache"
                            );
                            return Ok(snapshot);
                        }
                        Err(load_err) => {
                            warn!(path = %entry.path.display(), error = %load_err, "stale roster cache unreadable");
                        }
                    }
                }
                Err(SourceError::Unavailable(e.to_string()))
            }
        }
    }

    /// 外部名簿システムが応答するか確認する。
    pub async fn check_availability(&self) -> bool {
        match self.client.check_status().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "external roster system unavailable");
                false
            }
        }
    }
}
