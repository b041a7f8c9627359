//! Explicit configuration threaded into the registry client.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Connection settings for the registry. Built once at the CLI boundary.
#[derive(Clone)]
pub struct Config {
    pub token: String,
    /// Sent as the user agent, falls back to the crate name.
    pub user: Option<String>,
    pub api_url: Url,
    pub timeout: Duration,
    pub per_page: u32,
}

impl Config {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(Error::configuration("the github token is empty"));
        }

        Ok(Self {
            token,
            user: None,
            api_url: Url::parse(DEFAULT_API_URL)
                .map_err(|e| Error::configuration(e.to_string()))?,
            timeout: DEFAULT_TIMEOUT,
            per_page: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user.filter(|user| !user.trim().is_empty());
        self
    }

    /// Sets the API base url. A trailing slash is added so that relative
    /// endpoint paths join below it.
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self> {
        let mut api_url = api_url.trim().to_string();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        self.api_url = Url::parse(&api_url)
            .map_err(|e| Error::configuration(format!("invalid api url {api_url:?}: {e}")))?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Result<Self> {
        if per_page == 0 {
            return Err(Error::configuration("page size must be at least 1"));
        }
        self.per_page = per_page;
        Ok(self)
    }

    pub fn user_agent(&self) -> String {
        match &self.user {
            Some(user) => user.clone(),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .field("api_url", &self.api_url.as_str())
            .field("timeout", &self.timeout)
            .field("per_page", &self.per_page)
            .finish()
    }
}

/// Parses a comma-separated list of version ids. Blank entries are skipped.
pub fn parse_ids(ids: &str) -> Result<Vec<u64>> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>()
                .map_err(|_| Error::configuration(format!("invalid version id {id:?}")))
        })
        .collect()
}

/// Rejects a parallelism of zero, which would never admit a deletion.
pub fn validate_max_parallel(max_parallel: usize) -> Result<usize> {
    if max_parallel == 0 {
        return Err(Error::configuration("max parallel must be at least 1"));
    }
    Ok(max_parallel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new(" secret\n").unwrap();
        assert_eq!(config.token, "secret");
        assert_eq!(config.api_url.as_str(), DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.per_page, 100);
        assert!(config.user_agent().starts_with("pkgsweep/"));
    }

    #[test]
    fn test_config_rejects_empty_token() {
        assert!(matches!(Config::new("  "), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_api_url_gets_trailing_slash() {
        let config = Config::new("t")
            .unwrap()
            .with_api_url("https://github.example.com/api/v3")
            .unwrap();
        assert_eq!(config.api_url.as_str(), "https://github.example.com/api/v3/");
        assert!(Config::new("t").unwrap().with_api_url("not a url").is_err());
    }

    #[test]
    fn test_config_per_page() {
        let config = Config::new("t").unwrap().with_per_page(30).unwrap();
        assert_eq!(config.per_page, 30);
        assert!(matches!(
            Config::new("t").unwrap().with_per_page(0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_config_debug_hides_token() {
        let config = Config::new("supersecret").unwrap().with_user(Some("bot".into()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("supersecret"));
        assert_eq!(config.user_agent(), "bot");
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1, 2,,3 ,").unwrap(), vec![1, 2, 3]);
        assert!(parse_ids("").unwrap().is_empty());
        assert!(matches!(parse_ids("1,two,3"), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_max_parallel() {
        assert_eq!(validate_max_parallel(30).unwrap(), 30);
        assert!(validate_max_parallel(0).is_err());
    }
}
