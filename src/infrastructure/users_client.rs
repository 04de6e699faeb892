use async_trait::async_trait;
use serde_json::Value;

use crate::domain::entity::student::STUDENT_ROLE;
use crate::domain::entity::{id_value_to_string, ExistingStudent, NewStudent, StudentPatch};
use crate::infrastructure::config::ServiceEndpointConfig;
use crate::infrastructure::error::{
    build_http_client, check_response, map_request_error, unwrap_data, ClientError,
};

/// UsersClient は内部ユーザーサービスへのアクセスを抽象化する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsersClient: Send + Sync {
    /// ユーザーを ID で取得する。存在しなければ `ClientError::NotFound`。
    async fn get_user(&self, token: &str, user_id: &str) -> Result<ExistingStudent, ClientError>;

    /// クラスに所属する生徒一覧。
    async fn list_by_grade(&self, token: &str, grade_id: &str) -> Result<Vec<ExistingStudent>, ClientError>;

    /// 学校に所属する全生徒（クラス不問）。
    async fn list_by_school(&self, token: &str, school_id: &str) -> Result<Vec<ExistingStudent>, ClientError>;

    /// 正規化名 + 学校での存在確認。404 は Ok(None)。
    async fn find_existing(
        &self,
        token: &str,
        name: &str,
        school_id: &str,
    ) -> Result<Option<ExistingStudent>, ClientError>;

    /// 生徒を作成し、取得できれば内部 ID を返す。
    async fn create_user(&self, token: &str, student: &NewStudent) -> Result<Option<String>, ClientError>;

    /// 変更項目だけを送る部分更新。
    async fn patch_user(&self, token: &str, user_id: &str, patch: &StudentPatch) -> Result<(), ClientError>;
}

/// HttpUsersClient は reqwest による UsersClient 実装。
pub struct HttpUsersClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUsersClient {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn list_students(&self, token: &str, filter: (&str, &str)) -> Result<Vec<ExistingStudent>, ClientError> {
        let resp = self
            .http
            .get(self.url("/users"))
            .bearer_auth(token)
            .query(&[filter, ("role", STUDENT_ROLE)])
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = check_response(resp, "/users").await?;
        let body: Value = resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        serde_json::from_value(unwrap_data(body)).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// 存在確認のレスポンスは `{"exists": bool, "user": {...}}` か、ユーザー本体。
fn decode_existence(body: Value) -> Result<Option<ExistingStudent>, ClientError> {
    if body.get("exists").and_then(Value::as_bool) == Some(false) {
        return Ok(None);
    }
    let user = match body {
        Value::Object(mut map) if map.contains_key("user") => map.remove("user").unwrap_or(Value::Null),
        other => unwrap_data(other),
    };
    if user.is_null() {
        return Ok(None);
    }
    serde_json::from_value(user)
        .map(Some)
        .map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl UsersClient for HttpUsersClient {
    async fn get_user(&self, token: &str, user_id: &str) -> Result<ExistingStudent, ClientError> {
        let resource = format!("/users/{}", user_id);
        let resp = self
            .http
            .get(self.url(&resource))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = check_response(resp, &resource).await?;
        let body: Value = resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        serde_json::from_value(unwrap_data(body)).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn list_by_grade(&self, token: &str, grade_id: &str) -> Result<Vec<ExistingStudent>, ClientError> {
        self.list_students(token, ("gradeId", grade_id)).await
    }

    async fn list_by_school(&self, token: &str, school_id: &str) -> Result<Vec<ExistingStudent>, ClientError> {
        self.list_students(token, ("schoolId", school_id)).await
    }

    async fn find_existing(
        &self,
        token: &str,
        name: &str,
        school_id: &str,
    ) -> Result<Option<ExistingStudent>, ClientError> {
        let resp = self
            .http
            .get(self.url("/users/exists"))
            .bearer_auth(token)
            .query(&[("name", name), ("schoolId", school_id)])
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = match check_response(resp, "/users/exists").await {
            Ok(resp) => resp,
            Err(ClientError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let body: Value = resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        decode_existence(body)
    }

    async fn create_user(&self, token: &str, student: &NewStudent) -> Result<Option<String>, ClientError> {
        let resp = self
            .http
            .post(self.url("/users"))
            .bearer_auth(token)
            .json(student)
            .send()
            .await
            .map_err(map_request_error)?;
        let resp = check_response(resp, "/users").await?;
        let bytes = resp.bytes().await.map_err(map_request_error)?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(unwrap_data(body).get("id").and_then(id_value_to_string))
    }

    async fn patch_user(&self, token: &str, user_id: &str, patch: &StudentPatch) -> Result<(), ClientError> {
        let resource = format!("/users/{}", user_id);
        let resp = self
            .http
            .patch(self.url(&resource))
            .bearer_auth(token)
            .json(patch)
            .send()
            .await
            .map_err(map_request_error)?;
        check_response(resp, &resource).await?;
        Ok(())
    }
}
