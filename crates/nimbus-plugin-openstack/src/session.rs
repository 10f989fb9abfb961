//! Keystone session and authenticated HTTP client
//!
//! Authenticates with an application credential on first use and caches the
//! token and service catalog for the lifetime of the client. Endpoints are
//! taken from the catalog's `public` interface.

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::credentials::ApplicationCredential;
use crate::error::OpenStackError;

pub const SERVICE_IDENTITY: &str = "identity";
pub const SERVICE_COMPUTE: &str = "compute";
pub const SERVICE_VOLUME: &str = "volumev3";
pub const SERVICE_NETWORK: &str = "network";
pub const SERVICE_OBJECT_STORE: &str = "object-store";

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

/// Issued token plus the service catalog that came with it
struct Session {
    token: String,
    catalog: Vec<CatalogService>,
}

impl Session {
    fn endpoint(&self, service_type: &str) -> Result<String, OpenStackError> {
        self.catalog
            .iter()
            .filter(|s| s.service_type == service_type)
            .flat_map(|s| s.endpoints.iter())
            .find(|e| e.interface == "public")
            .map(|e| e.url.trim_end_matches('/').to_string())
            .ok_or_else(|| OpenStackError::MissingEndpoint(service_type.to_string()))
    }
}

/// Keystone v3 base URL for a configured auth URL
pub fn identity_base(auth_url: &str) -> String {
    let trimmed = auth_url.trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        trimmed.to_string()
    } else {
        format!("{}/v3", trimmed)
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.trim_end_matches('/').to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// HTTP client bound to one set of application credentials
pub struct OpenStackClient {
    http: Client,
    identity_url: String,
    credential: ApplicationCredential,
    session: OnceCell<Session>,
}

impl OpenStackClient {
    pub fn new(http: Client, auth_url: &str, credential: ApplicationCredential) -> Self {
        Self {
            http,
            identity_url: identity_base(auth_url),
            credential,
            session: OnceCell::new(),
        }
    }

    pub fn identity_url(&self) -> &str {
        &self.identity_url
    }

    async fn session(&self) -> Result<&Session, OpenStackError> {
        self.session.get_or_try_init(|| self.authenticate()).await
    }

    async fn authenticate(&self) -> Result<Session, OpenStackError> {
        let url = join_url(&self.identity_url, "auth/tokens");
        debug!("Authenticating with Keystone: {}", url);

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["application_credential"],
                    "application_credential": {
                        "id": self.credential.id,
                        "secret": self.credential.secret,
                    }
                }
            }
        });

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OpenStackError::AuthFailed(format!("{}: {}", status, body)));
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                OpenStackError::AuthFailed(format!("response has no {} header", SUBJECT_TOKEN_HEADER))
            })?;
        let parsed: TokenResponse = response.json().await?;

        debug!(
            services = parsed.token.catalog.len(),
            "Keystone authentication successful"
        );
        Ok(Session {
            token,
            catalog: parsed.token.catalog,
        })
    }

    /// Public endpoint of a service; identity always uses the configured auth URL
    pub async fn endpoint(&self, service_type: &str) -> Result<String, OpenStackError> {
        if service_type == SERVICE_IDENTITY {
            return Ok(self.identity_url.clone());
        }
        self.session().await?.endpoint(service_type)
    }

    /// Authenticated request; non-success statuses become `RequestFailed`
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, OpenStackError> {
        let session = self.session().await?;
        let mut request = self
            .http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &session.token);
        if !query.is_empty() {
            request = request.query(query);
        }
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(OpenStackError::RequestFailed { status, body })
        }
    }

    pub async fn get_json(
        &self,
        service_type: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, OpenStackError> {
        let url = join_url(&self.endpoint(service_type).await?, path);
        let response = self.send(Method::GET, &url, query, &[], None).await?;
        read_json(response).await
    }

    pub async fn send_json(
        &self,
        method: Method,
        service_type: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, OpenStackError> {
        let url = join_url(&self.endpoint(service_type).await?, path);
        let response = self.send(method, &url, &[], &[], body).await?;
        read_json(response).await
    }

    pub async fn delete(&self, service_type: &str, path: &str) -> Result<(), OpenStackError> {
        let url = join_url(&self.endpoint(service_type).await?, path);
        self.send(Method::DELETE, &url, &[], &[], None).await?;
        Ok(())
    }

    pub async fn head(&self, url: &str) -> Result<HeaderMap, OpenStackError> {
        let response = self.send(Method::HEAD, url, &[], &[], None).await?;
        Ok(response.headers().clone())
    }

    pub async fn post_headers(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<(), OpenStackError> {
        self.send(Method::POST, url, &[], headers, None).await?;
        Ok(())
    }
}

async fn read_json(response: Response) -> Result<Value, OpenStackError> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}
