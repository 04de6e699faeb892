use async_trait::async_trait;
use serde_json::Value;

use crate::domain::entity::{id_value_to_string, ExistingClass, ProcessedClass};
use crate::infrastructure::config::ServiceEndpointConfig;
use crate::infrastructure::error::{
    build_http_client, check_response, map_request_error, unwrap_data, ClientError,
};

/// ClassCreationResponse は POST /classes 成功時のレスポンス形状。
/// 内部クラスサービスは ID の位置が一定しないため、形状ごとに 1 バリアントを持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassCreationResponse {
    /// `{"id": ...}`
    TopLevel(String),
    /// `{"grade": {"id": ...}}`
    NestedGrade(String),
    /// `{"data": {"id": ...}}`
    NestedData(String),
    /// 成功したが ID を読み取れなかった。
    Provisional,
}

impl ClassCreationResponse {
    pub fn id(&self) -> Option<&str> {
        match self {
            ClassCreationResponse::TopLevel(id)
            | ClassCreationResponse::NestedGrade(id)
            | ClassCreationResponse::NestedData(id) => Some(id),
            ClassCreationResponse::Provisional => None,
        }
    }
}

/// decode_class_creation は作成レスポンスの本文を ClassCreationResponse に変換する。
pub fn decode_class_creation(body: &Value) -> ClassCreationResponse {
    let nested = |key: &str| body.get(key).and_then(|v| v.get("id")).and_then(id_value_to_string);

    if let Some(id) = body.get("id").and_then(id_value_to_string) {
        ClassCreationResponse::TopLevel(id)
    } else if let Some(id) = nested("grade") {
        ClassCreationResponse::NestedGrade(id)
    } else if let Some(id) = nested("data") {
        ClassCreationResponse::NestedData(id)
    } else {
        ClassCreationResponse::Provisional
    }
}

/// ClassesClient は内部クラスサービスへのアクセスを抽象化する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassesClient: Send + Sync {
    /// 学校に登録済みのクラス一覧を取得する。
    async fn list_classes(&self, token: &str, school_id: &str) -> Result<Vec<ExistingClass>, ClientError>;

    /// クラスを 1 件作成する。
    async fn create_class(&self, token: &str, class: &ProcessedClass) -> Result<ClassCreationResponse, ClientError>;
}

/// HttpClassesClient は reqwest による ClassesClient 実装。
pub struct HttpClassesClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClassesClient {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self, ClientError> {
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
impl ClassesClient for HttpClassesClient {
    async fn list_classes(&self, token: &str, school_id: &str) -> Result<Vec<ExistingClass>, ClientError> {
        let resp = self
            .http
            .get(self.url("/classes"))
            .bearer_auth(token)
            .query(&[("schoolId", school_id)])
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = check_response(resp, "/classes").await?;
        let body: Value = resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        serde_json::from_value(unwrap_data(body)).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn create_class(&self, token: &str, class: &ProcessedClass) -> Result<ClassCreationResponse, ClientError> {
        let payload = serde_json::json!({
            "name": class.name,
            "description": class.description,
            "shift": class.shift,
            "schoolId": class.school_id,
            "districtId": class.district_id,
        });
        let resp = self
            .http
            .post(self.url("/classes"))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = check_response(resp, "/classes").await?;
        // 本文が空・JSON でない成功レスポンスも作成済みとして扱う
        let bytes = resp.bytes().await.map_err(map_request_error)?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(decode_class_creation(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Shift;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_class() -> ProcessedClass {
        ProcessedClass {
            name: "6M01".to_string(),
            description: "Turma 6M01 - Matutino".to_string(),
            shift: Shift::Matutino,
            school_id: "s1".to_string(),
            district_id: "d1".to_string(),
            id: None,
            provisional: false,
        }
    }

    #[test]
    fn test_decode_class_creation_shapes() {
        assert_eq!(
            decode_class_creation(&serde_json::json!({"id": "c1"})),
            ClassCreationResponse::TopLevel("c1".to_string())
        );
        assert_eq!(
            decode_class_creation(&serde_json::json!({"grade": {"id": 42}})),
            ClassCreationResponse::NestedGrade("42".to_string())
        );
        assert_eq!(
            decode_class_creation(&serde_json::json!({"data": {"id": "c3"}})),
            ClassCreationResponse::NestedData("c3".to_string())
        );
        assert_eq!(
            decode_class_creation(&serde_json::json!({"message": "ok"})),
            ClassCreationResponse::Provisional
        );
        assert_eq!(decode_class_creation(&Value::Null), ClassCreationResponse::Provisional);
    }

    #[test]
    fn test_decode_prefers_top_level_id() {
        let body = serde_json::json!({"id": "top", "data": {"id": "nested"}});
        assert_eq!(decode_class_creation(&body).id(), Some("top"));
    }

    #[tokio::test]
    async fn test_list_classes_accepts_wrapped_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/classes"))
            .and(query_param("schoolId", "s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": 7, "name": "6M01", "shift": "matutino"}]
            })))
            .mount(&server)
            .await;

        let client = HttpClassesClient::new(&ServiceEndpointConfig::new(server.uri())).unwrap();
        let classes = client.list_classes("tok", "s1").await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].id, "7");
    }

    #[tokio::test]
    async fn test_create_class_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classes"))
            .and(body_partial_json(serde_json::json!({
                "name": "6M01",
                "shift": "matutino",
                "schoolId": "s1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"grade": {"id": "g1"}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClassesClient::new(&ServiceEndpointConfig::new(server.uri())).unwrap();
        let resp = client.create_class("tok", &sample_class()).await.unwrap();
        assert_eq!(resp, ClassCreationResponse::NestedGrade("g1".to_string()));
    }

    #[tokio::test]
    async fn test_create_class_empty_body_is_provisional() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classes"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = HttpClassesClient::new(&ServiceEndpointConfig::new(server.uri())).unwrap();
        let resp = client.create_class("tok", &sample_class()).await.unwrap();
        assert_eq!(resp, ClassCreationResponse::Provisional);
    }

    #[tokio::test]
    async fn test_create_class_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classes"))
            .respond_with(ResponseTemplate::new(422).set_body_string("duplicate name"))
            .mount(&server)
            .await;

        let client = HttpClassesClient::new(&ServiceEndpointConfig::new(server.uri())).unwrap();
        let err = client.create_class("tok", &sample_class()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 422: duplicate name");
    }
}
