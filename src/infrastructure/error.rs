/// ClientError は外部・内部サービス呼び出しのエラー。
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// `reqwest::Error` を `ClientError` へ変換するヘルパー。
pub(crate) fn map_request_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(e.to_string())
    } else if e.is_decode() {
        ClientError::Decode(e.to_string())
    } else {
        ClientError::Transport(e.to_string())
    }
}

/// HTTP レスポンスのステータスを確認し、エラーを `ClientError` に変換する。
pub(crate) async fn check_response(
    resp: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status.as_u16() {
        404 => Err(ClientError::NotFound(resource.to_string())),
        code => Err(ClientError::Status { status: code, body }),
    }
}

/// 内部サービスはレスポンス本体を `{"data": ...}` で包むことがあるため外す。
pub(crate) fn unwrap_data(body: serde_json::Value) -> serde_json::Value {
    match body {
        serde_json::Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(serde_json::Value::Null)
        }
        other => other,
    }
}

pub(crate) fn build_http_client(timeout: std::time::Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ClientError::Status {
            status: 422,
            body: "invalid grade".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 422: invalid grade");
        assert!(ClientError::NotFound("/users/1".to_string()).is_not_found());
        assert!(!ClientError::Timeout("5s".to_string()).is_not_found());
    }

    #[test]
    fn test_unwrap_data() {
        let wrapped = serde_json::json!({"data": [{"id": 1}]});
        assert_eq!(unwrap_data(wrapped), serde_json::json!([{"id": 1}]));
        let bare = serde_json::json!({"id": 1});
        assert_eq!(unwrap_data(bare.clone()), bare);
    }
}
