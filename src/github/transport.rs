use std::fmt::Display;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT},
    Client, ClientBuilder,
};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// Status, headers and undecoded body of a response.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.status)
    }
}

/// Issues a single authenticated request. Status codes are not interpreted.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, url: &Url) -> Result<RawResponse>;
}

/// [`Transport`] backed by a `reqwest` client with the bearer token baked
/// into its default headers.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = config.user_agent();
        log::debug!("{}: {}", USER_AGENT.as_str(), user_agent);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header_value("application/vnd.github.v3+json")?);
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.token))?,
        );
        headers.insert(USER_AGENT, header_value(&user_agent)?);

        let client = ClientBuilder::new()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to create http client: {e}")))?;
        Ok(Self { client })
    }
}

fn header_value(value: &str) -> Result<reqwest::header::HeaderValue> {
    value
        .try_into()
        .map_err(|_| Error::configuration("header value contains invalid characters"))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, url: &Url) -> Result<RawResponse> {
        let request = match method {
            Method::Get => self.client.get(url.clone()),
            Method::Delete => self.client.delete(url.clone()),
        };

        let transport_error = |source: reqwest::Error| Error::Transport {
            url: url.to_string(),
            source: Box::new(source),
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
