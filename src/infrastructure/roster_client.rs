use async_trait::async_trait;
use serde_json::Value;

use crate::domain::entity::RosterSnapshot;
use crate::infrastructure::config::RosterSourceConfig;
use crate::infrastructure::error::{build_http_client, check_response, map_request_error, ClientError};

/// RosterSourceClient は外部名簿システム（SEGES）へのアクセスを抽象化する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RosterSourceClient: Send + Sync {
    /// 学校全体の名簿スナップショットを取得する。
    async fn fetch_roster(&self, token: &str) -> Result<RosterSnapshot, ClientError>;

    /// ヘルスチェック。2xx 以外はエラー。
    async fn check_status(&self) -> Result<(), ClientError>;
}

/// HttpRosterSourceClient は reqwest による RosterSourceClient 実装。
pub struct HttpRosterSourceClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRosterSourceClient {
    pub fn new(config: &RosterSourceConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RosterSourceClient for HttpRosterSourceClient {
    async fn fetch_roster(&self, token: &str) -> Result<RosterSnapshot, ClientError> {
        let resp = self
            .http
            .get(self.url("/rosters"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = check_response(resp, "/rosters").await?;
        let body: Value = resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        RosterSnapshot::from_json(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn check_status(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .get(self.url("/status"))
            .send()
            .await
            .map_err(map_request_error)?;
        check_response(resp, "/status").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(url: &str) -> HttpRosterSourceClient {
        HttpRosterSourceClient::new(&RosterSourceConfig {
            base_url: format!("{}/", url),
            timeout_ms: 5000,
            cache_dir: "unused".to_string(),
            cache_pattern: "roster_*.json".to_string(),
            cache_max_age_secs: 60,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_roster_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rosters"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "6M01": [{"nome": "Ana Maria Souza", "telefone": "11999999999"}],
                "7V02": [],
                "metadata": {"version": "2026.2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = make_client(&server.uri()).fetch_roster("tok-1").await.unwrap();
        assert_eq!(snapshot.class_names().collect::<Vec<_>>(), vec!["6M01", "7V02"]);
        assert_eq!(snapshot.student_count(), 1);
        assert_eq!(snapshot.metadata.version.as_deref(), Some("2026.2"));
    }

    #[tokio::test]
    async fn test_fetch_roster_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rosters"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = make_client(&server.uri()).fetch_roster("tok").await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_roster_rejects_non_object_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rosters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .mount(&server)
            .await;

        let err = make_client(&server.uri()).fetch_roster("tok").await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_check_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(make_client(&server.uri()).check_status().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = make_client("http://127.0.0.1:1");
        let err = client.check_status().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_) | ClientError::Timeout(_)));
    }
}
