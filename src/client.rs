use std::str::FromStr;

use crate::{error::Result, AssistantError, Credentials, OpenAiError};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Header carrying the Assistants API protocol version.
pub const VERSION_HEADER: &str = "OpenAI-Beta";

/// Default value of [`VERSION_HEADER`].
pub const DEFAULT_VERSION: &str = "assistants=v2";

/// Authenticated JSON transport for the Assistants API.
///
/// Every request carries the bearer token, JSON content headers and the
/// protocol version header. Responses go through three checks, in order:
/// HTTP status, JSON decoding, and the body's own `error`/`last_error`
/// fields.
#[derive(Clone)]
pub struct OpenAiClient {
    credentials: Credentials,
    client: Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpenAiClient({})", self.credentials.base_url())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiErrorWrapper {
    error: OpenAiError,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Deleted {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub deleted: bool,
}

impl OpenAiClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_version(credentials, DEFAULT_VERSION)
    }

    pub fn with_version(credentials: Credentials, version: &str) -> Result<Self> {
        let header = |value: &str| {
            HeaderValue::from_str(value)
                .map_err(|e| AssistantError::Configuration(format!("invalid header value: {e}")))
        };
        let version_header = HeaderName::from_str(VERSION_HEADER)
            .map_err(|e| AssistantError::Configuration(e.to_string()))?;

        let mut authorization = header(&format!("Bearer {}", credentials.api_key()))?;
        authorization.set_sensitive(true);

        let headers: HeaderMap = [
            (AUTHORIZATION, authorization),
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (ACCEPT, HeaderValue::from_static("application/json")),
            (version_header, header(version)?),
        ]
        .into_iter()
        .collect();

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            credentials,
            client,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn request_inner<S, R>(
        &self,
        method: Method,
        route: R,
        body: Option<S>,
    ) -> Result<Response, reqwest::Error>
    where
        R: Into<String>,
        S: Serialize,
    {
        let url = format!("{}{}", self.credentials.base_url(), route.into());
        log::debug!("OpenAI Request[{}] {}", method, url);

        let mut request = self.client.request(method.clone(), url.clone());

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;

        log::debug!(
            "OpenAI Response[{}] {} {url}",
            method,
            response.status().as_str()
        );
        Ok(response)
    }

    /// Sends a request and returns the checked JSON body.
    pub async fn request_json<S, R>(&self, method: Method, route: R, body: Option<S>) -> Result<Value>
    where
        R: Into<String>,
        S: Serialize,
    {
        let response = self.request_inner(method, route, body).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = serde_json::from_str::<OpenAiErrorWrapper>(&text)
                .ok()
                .map(|wrapper| wrapper.error);

            return Err(AssistantError::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
                error,
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AssistantError::malformed(format!("response is not JSON: {e}")))?;

        check_upstream_error(&value)?;

        Ok(value)
    }

    pub async fn request<S, R, T>(&self, method: Method, route: R, body: Option<S>) -> Result<T>
    where
        R: Into<String>,
        S: Serialize,
        T: DeserializeOwned,
    {
        let value = self.request_json(method, route, body).await?;

        serde_json::from_value(value).map_err(|e| {
            AssistantError::malformed(format!(
                "unexpected shape for {}: {e}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub async fn get<R, T>(&self, route: R) -> Result<T>
    where
        R: Into<String>,
        T: DeserializeOwned,
    {
        self.request::<(), R, T>(Method::GET, route, None).await
    }

    pub async fn post<S, R, T>(&self, route: R, body: S) -> Result<T>
    where
        R: Into<String>,
        S: Serialize,
        T: DeserializeOwned,
    {
        self.request(Method::POST, route, Some(body)).await
    }

    /// Deletes a resource; the response must confirm the deletion.
    pub async fn delete<R>(&self, route: R) -> Result<Deleted>
    where
        R: Into<String>,
    {
        let route = route.into();
        let deleted: Deleted = self.request::<(), _, _>(Method::DELETE, route.clone(), None).await?;

        if !deleted.deleted {
            return Err(AssistantError::malformed(format!(
                "deletion of `{route}` was not confirmed"
            )));
        }

        Ok(deleted)
    }

    /// Fetches one page of a list endpoint.
    pub async fn list_page<T>(&self, route: &str, query: &ListQuery) -> Result<List<T>>
    where
        T: DeserializeOwned,
    {
        self.get(format!("{route}?{}", query.to_query_string())).await
    }

    /// Fetches every item of a list endpoint, following `has_more`.
    ///
    /// Stops at an empty page or a cursor that does not advance, whatever
    /// `has_more` says.
    pub async fn list<T>(&self, route: &str, order: Order) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut query = ListQuery {
            order,
            ..Default::default()
        };
        let mut data = Vec::new();

        loop {
            let page: List<T> = self.list_page(route, &query).await?;
            let empty = page.data.is_empty();
            data.extend(page.data);

            match page.last_id {
                Some(last_id) if page.has_more && !empty => {
                    if query.after.as_ref() == Some(&last_id) {
                        log::warn!("Pagination of `{route}` repeated cursor {last_id}; stopping");
                        break;
                    }
                    query.after = Some(last_id);
                }
                _ => break,
            }
        }

        Ok(data)
    }
}

/// Rejects bodies that report an error of their own.
///
/// Runs that failed carry `last_error`; other endpoints may carry `error`.
fn check_upstream_error(value: &Value) -> Result<()> {
    for field in ["error", "last_error"] {
        match value.get(field) {
            None | Some(Value::Null) => {}
            Some(error) => {
                let error = serde_json::from_value::<OpenAiError>(error.clone())
                    .unwrap_or_else(|_| OpenAiError::new(error.to_string(), "unknown".to_string()));
                return Err(AssistantError::Upstream(error));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct List<T> {
    #[serde(default)]
    pub first_id: Option<String>,
    #[serde(default)]
    pub last_id: Option<String>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub order: Order,
    pub limit: Option<u32>,
    pub after: Option<String>,
}

impl ListQuery {
    fn to_query_string(&self) -> String {
        let mut query = format!("order={}", self.order.as_str());

        if let Some(limit) = self.limit {
            query.push_str(&format!("&limit={limit}"));
        }
        if let Some(after) = &self.after {
            query.push_str(&format!("&after={after}"));
        }

        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_error_fields_pass() {
        assert!(check_upstream_error(&json!({ "id": "run_1", "last_error": null })).is_ok());
        assert!(check_upstream_error(&json!({ "id": "run_1" })).is_ok());
    }

    #[test]
    fn last_error_is_upstream_error() {
        let result = check_upstream_error(&json!({
            "id": "run_1",
            "status": "failed",
            "last_error": { "code": "server_error", "message": "Something went wrong" }
        }));

        match result {
            Err(AssistantError::Upstream(error)) => {
                assert_eq!(error.message, "Something went wrong");
                assert_eq!(error.code.as_deref(), Some("server_error"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn unstructured_error_keeps_raw_text() {
        match check_upstream_error(&json!({ "error": "boom" })) {
            Err(AssistantError::Upstream(error)) => assert_eq!(error.message, "\"boom\""),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn list_query_string() {
        let query = ListQuery {
            order: Order::Desc,
            limit: Some(1),
            after: None,
        };
        assert_eq!(query.to_query_string(), "order=desc&limit=1");

        let query = ListQuery {
            order: Order::Asc,
            limit: None,
            after: Some("msg_9".to_string()),
        };
        assert_eq!(query.to_query_string(), "order=asc&after=msg_9");
    }

    #[test]
    fn missing_data_is_empty_list() {
        let list: List<Value> = serde_json::from_value(json!({ "object": "list" })).unwrap();

        assert!(list.data.is_empty());
        assert!(!list.has_more);
    }

    #[test]
    fn rejects_invalid_api_key_header() {
        let result = OpenAiClient::new(Credentials::new("bad\nkey", crate::BASE_URL));

        assert!(matches!(result, Err(AssistantError::Configuration(_))));
    }
}
