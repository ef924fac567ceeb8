//! HTTP plumbing shared by the vendor adapters.
//!
//! Every response body is buffered. Non-2xx statuses are logged with the body
//! size (the body itself at debug level) and returned as
//! [`HttpError::Status`]; bodies that fail to decode after a 2xx response
//! degrade to the default value of the target type.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use regfleet_core::{Credentials, Error, Registry, Result};

use crate::config::ClientConfig;
use crate::error::HttpError;

/// Authenticated client bound to one registry endpoint.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    http: reqwest::Client,
    base: Url,
    registry: String,
    headers: HeaderMap,
}

impl HttpClient {
    /// Creates a client for the registry's API endpoint.
    pub(crate) fn new(registry: &Registry, config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(registry.api_endpoint()).map_err(|e| {
            Error::configuration(format!(
                "registry '{}' has an invalid API endpoint '{}': {e}",
                registry.name(),
                registry.api_endpoint()
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            registry: registry.name().to_string(),
            headers: auth_headers(registry.credentials())?,
        })
    }

    fn url(&self, path: &str) -> std::result::Result<Url, HttpError> {
        self.base.join(path).map_err(|source| HttpError::InvalidUrl {
            url: format!("{}{path}", self.base),
            source,
        })
    }

    /// Sends a request and returns the buffered body of a 2xx response.
    pub(crate) async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> std::result::Result<String, HttpError> {
        let url = self.url(path)?;
        tracing::debug!(registry = %self.registry, method = %method, url = %url, "sending request");

        let mut request = self
            .http
            .request(method, url.clone())
            .headers(self.headers.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .json(body);
        }

        let response = request.send().await.map_err(|source| {
            tracing::error!(registry = %self.registry, url = %url, error = %source, "request failed");
            HttpError::Transport {
                url: url.to_string(),
                source,
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            tracing::warn!(
                registry = %self.registry,
                status = status.as_u16(),
                url = %url,
                body_size = text.len(),
                "HTTP response status code is not OK"
            );
            tracing::debug!(registry = %self.registry, body = %text, "response body");
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(text)
    }

    /// GETs a JSON document.
    pub(crate) async fn get_json<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, HttpError> {
        let text = self.send::<()>(Method::GET, path, query, None).await?;
        Ok(self.decode(path, &text))
    }

    /// POSTs a JSON body and decodes the JSON answer.
    pub(crate) async fn post_json<B: Serialize + Sync, T: DeserializeOwned + Default>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, HttpError> {
        let text = self.send(Method::POST, path, &[], Some(body)).await?;
        Ok(self.decode(path, &text))
    }

    /// PUTs an optional JSON body, discarding the answer.
    pub(crate) async fn put<B: Serialize + Sync>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> std::result::Result<(), HttpError> {
        self.send(Method::PUT, path, &[], body).await.map(drop)
    }

    /// Sends a DELETE.
    pub(crate) async fn delete(&self, path: &str) -> std::result::Result<(), HttpError> {
        self.send::<()>(Method::DELETE, path, &[], None)
            .await
            .map(drop)
    }

    fn decode<T: DeserializeOwned + Default>(&self, path: &str, text: &str) -> T {
        if text.trim().is_empty() {
            return T::default();
        }
        serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::warn!(
                registry = %self.registry,
                path,
                error = %e,
                "json decoding failed, using an empty result"
            );
            tracing::debug!(registry = %self.registry, body = %text, "undecodable body");
            T::default()
        })
    }
}

fn auth_headers(credentials: &Credentials) -> Result<HeaderMap> {
    let encoded = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        format!("{}:{}", credentials.username, credentials.password),
    );
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .map_err(|_| Error::configuration("credentials cannot be sent as a header"))?;
    value.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regfleet_core::{CliOptions, ProviderKind, RegistryRole, RegistrySpec};

    fn registry(endpoint: &str) -> Registry {
        Registry::from_spec(
            RegistrySpec {
                name: "hub".to_string(),
                provider: ProviderKind::Harbor,
                api_endpoint: endpoint.to_string(),
                username: "admin".to_string(),
                password: "Harbor12345".to_string(),
                role: RegistryRole::GlobalHub,
                annotations: std::collections::BTreeMap::new(),
            },
            &CliOptions::default(),
        )
    }

    #[test]
    fn test_invalid_endpoint_is_configuration_error() {
        let err = HttpClient::new(&registry("::not-a-url"), &ClientConfig::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_basic_auth_header() {
        let headers = auth_headers(&Credentials::new("admin", "Harbor12345")).unwrap();
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46SGFyYm9yMTIzNDU="
        );
    }

    #[test]
    fn test_decode_degrades_to_default() {
        let client = HttpClient::new(&registry("https://hub.example.com"), &ClientConfig::default())
            .unwrap();
        let value: Vec<String> = client.decode("/x", "<html>oops</html>");
        assert!(value.is_empty());
        let value: Vec<String> = client.decode("/x", "");
        assert!(value.is_empty());
        let value: Vec<String> = client.decode("/x", r#"["a"]"#);
        assert_eq!(value, vec!["a".to_string()]);
    }

    #[test]
    fn test_url_join() {
        let client = HttpClient::new(&registry("https://hub.example.com/"), &ClientConfig::default())
            .unwrap();
        assert_eq!(
            client.url("/api/v2.0/projects").unwrap().as_str(),
            "https://hub.example.com/api/v2.0/projects"
        );
    }
}
