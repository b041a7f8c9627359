use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use url::{form_urlencoded, Url};

use super::links::next_link;
use super::transport::{HttpTransport, Method, RawResponse, Transport};
use super::{Package, PackageRegistry, PackageVersion};
use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Registry client for the organization package endpoints.
pub struct GithubClient<T = HttpTransport> {
    transport: T,
    api_url: Url,
    per_page: u32,
}

impl GithubClient<HttpTransport> {
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(
            transport,
            config.api_url.clone(),
            config.per_page,
        ))
    }
}

impl<T: Transport> GithubClient<T> {
    pub fn with_transport(transport: T, api_url: Url, per_page: u32) -> Self {
        Self {
            transport,
            api_url,
            per_page,
        }
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::configuration(format!("invalid endpoint {path:?}: {e}")))
    }

    /// Sends a request and turns an error status into [`Error::Registry`].
    async fn request(&self, method: Method, url: &Url) -> Result<RawResponse> {
        log::debug!("{} {}", method, url);
        let response = self.transport.send(method, url).await?;

        if response.is_error() {
            let message = serde_json::from_slice::<ErrorBody>(&response.body)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&response.body).trim().to_string());
            return Err(Error::Registry {
                status: response.status,
                message,
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    /// Fetches a single object.
    pub async fn get<M: DeserializeOwned>(&self, path: &str) -> Result<M> {
        let url = self.resolve(path)?;
        let response = self.request(Method::Get, &url).await?;
        decode(&url, &response.body)
    }

    /// Fetches every page of a list endpoint by following `rel="next"` links.
    /// Pages are concatenated in registry order; one undecodable page fails
    /// the whole listing.
    pub async fn get_all<M: DeserializeOwned>(&self, path: &str) -> Result<Vec<M>> {
        let mut url = self.resolve(path)?;
        if !url.query_pairs().any(|(key, _)| key == "per_page") {
            url.query_pairs_mut()
                .append_pair("per_page", &self.per_page.to_string());
        }

        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let response = self.request(Method::Get, &url).await?;
            let mut page_items: Vec<M> = decode(&url, &response.body)?;
            log::debug!("Fetched page {} with {} items", page, page_items.len());
            items.append(&mut page_items);

            match next_link(&response.headers) {
                Some(next) => {
                    url = self.resolve(&next)?;
                    page += 1;
                }
                None => break,
            }
        }

        Ok(items)
    }

    /// Issues a DELETE. A non-empty success body is ignored.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.resolve(path)?;
        let response = self.request(Method::Delete, &url).await?;
        if !response.body.is_empty() {
            log::debug!("Ignoring {} byte body of DELETE {}", response.body.len(), url);
        }
        Ok(())
    }
}

fn decode<M: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<M> {
    serde_json::from_slice(body).map_err(|source| Error::Decode {
        url: url.to_string(),
        source,
    })
}

fn encode_name(name: &str) -> String {
    form_urlencoded::byte_serialize(name.as_bytes()).collect()
}

#[async_trait]
impl<T: Transport> PackageRegistry for GithubClient<T> {
    async fn list_packages(&self, owner: &str) -> Result<Vec<Package>> {
        self.get_all(&format!("orgs/{owner}/packages?package_type=container"))
            .await
    }

    async fn get_package(&self, owner: &str, package: &str) -> Result<Package> {
        self.get(&format!(
            "orgs/{owner}/packages/container/{}",
            encode_name(package)
        ))
        .await
    }

    async fn list_package_versions(
        &self,
        owner: &str,
        package: &str,
    ) -> Result<Vec<PackageVersion>> {
        let mut versions: Vec<PackageVersion> = self
            .get_all(&format!(
                "orgs/{owner}/packages/container/{}/versions",
                encode_name(package)
            ))
            .await?;

        let parent = self.get_package(owner, package).await?;
        for version in &mut versions {
            version.package = Some(parent.clone());
        }

        Ok(versions)
    }

    async fn delete_package_version(
        &self,
        owner: &str,
        package: &str,
        version_id: u64,
    ) -> Result<()> {
        self.delete(&format!(
            "orgs/{owner}/packages/container/{}/versions/{version_id}",
            encode_name(package)
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use reqwest::header::{HeaderValue, LINK};
    use serde_json::{json, Value};

    use super::*;
    use crate::github::api::fixtures;

    /// Serves scripted responses keyed by method and full url.
    #[derive(Default)]
    struct FakeTransport {
        responses: HashMap<(Method, String), RawResponse>,
        requests: Mutex<Vec<(Method, String)>>,
    }

    impl FakeTransport {
        fn respond(mut self, method: Method, url: &str, status: u16, body: Value) -> Self {
            self.responses.insert(
                (method, url.to_string()),
                RawResponse {
                    status,
                    body: serde_json::to_vec(&body).unwrap(),
                    ..Default::default()
                },
            );
            self
        }

        fn page(mut self, url: &str, body: Value, next: Option<&str>) -> Self {
            let mut response = RawResponse {
                status: 200,
                body: serde_json::to_vec(&body).unwrap(),
                ..Default::default()
            };
            if let Some(next) = next {
                let value = format!(r#"<{next}>; rel="next", <{url}>; rel="prev""#);
                response
                    .headers
                    .insert(LINK, HeaderValue::from_str(&value).unwrap());
            }
            self.responses.insert((Method::Get, url.to_string()), response);
            self
        }

        fn requested(&self) -> Vec<(Method, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, method: Method, url: &Url) -> Result<RawResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((method, url.to_string()));
            Ok(self
                .responses
                .get(&(method, url.to_string()))
                .cloned()
                .unwrap_or(RawResponse {
                    status: 404,
                    body: br#"{"message": "Not Found"}"#.to_vec(),
                    ..Default::default()
                }))
        }
    }

    fn client(transport: FakeTransport) -> GithubClient<FakeTransport> {
        GithubClient::with_transport(
            transport,
            Url::parse("https://api.github.com/").unwrap(),
            100,
        )
    }

    fn items(range: std::ops::Range<u64>) -> Value {
        Value::Array(range.map(|id| json!({ "id": id })).collect())
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Item {
        id: u64,
    }

    const PAGE_1: &str = "https://api.github.com/orgs/acme/things?per_page=100";
    const PAGE_2: &str = "https://api.github.com/orgs/acme/things?per_page=100&page=2";
    const PAGE_3: &str = "https://api.github.com/orgs/acme/things?per_page=100&page=3";

    #[tokio::test]
    async fn test_get_all_concatenates_pages_in_order() {
        let transport = FakeTransport::default()
            .page(PAGE_1, items(0..3), Some(PAGE_2))
            .page(PAGE_2, items(3..5), Some(PAGE_3))
            .page(PAGE_3, items(5..6), None);
        let client = client(transport);

        let all: Vec<Item> = client.get_all("orgs/acme/things").await.unwrap();
        assert_eq!(all.iter().map(|item| item.id).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            client.transport.requested(),
            vec![
                (Method::Get, PAGE_1.to_string()),
                (Method::Get, PAGE_2.to_string()),
                (Method::Get, PAGE_3.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_all_single_page() {
        let client = client(FakeTransport::default().page(PAGE_1, items(0..2), None));
        let all: Vec<Item> = client.get_all("/orgs/acme/things").await.unwrap();
        assert_eq!(all, vec![Item { id: 0 }, Item { id: 1 }]);
        assert_eq!(client.transport.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_get_all_keeps_explicit_page_size() {
        let url = "https://api.github.com/orgs/acme/things?per_page=5";
        let client = client(FakeTransport::default().page(url, items(0..1), None));
        let all: Vec<Item> = client.get_all("orgs/acme/things?per_page=5").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(client.transport.requested()[0].1, url);
    }

    #[tokio::test]
    async fn test_get_all_fails_on_undecodable_page() {
        let transport = FakeTransport::default()
            .page(PAGE_1, items(0..3), Some(PAGE_2))
            .page(PAGE_2, json!([{ "id": "not a number" }]), None);
        let client = client(transport);

        let error = client.get_all::<Item>("orgs/acme/things").await.unwrap_err();
        assert!(matches!(error, Error::Decode { ref url, .. } if url == PAGE_2));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_registry_error() {
        let url = "https://api.github.com/orgs/acme/packages/container/gone";
        let client = client(FakeTransport::default().respond(
            Method::Get,
            url,
            403,
            json!({ "message": "Must have admin rights" }),
        ));

        let error = client.get::<Value>("orgs/acme/packages/container/gone").await.unwrap_err();
        match error {
            Error::Registry {
                status,
                message,
                url: error_url,
            } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Must have admin rights");
                assert_eq!(error_url, url);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_without_message_uses_body() {
        let url = "https://api.github.com/broken";
        let mut transport = FakeTransport::default();
        transport.responses.insert(
            (Method::Get, url.to_string()),
            RawResponse {
                status: 502,
                body: b"Bad Gateway\n".to_vec(),
                ..Default::default()
            },
        );

        let error = client(transport).get::<Value>("broken").await.unwrap_err();
        assert!(matches!(error, Error::Registry { status: 502, ref message, .. } if message == "Bad Gateway"));
    }

    fn version_json(id: u64, tags: &[&str]) -> Value {
        let version = fixtures::version(id, tags, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        serde_json::to_value(version).unwrap()
    }

    #[tokio::test]
    async fn test_list_packages() {
        let url = "https://api.github.com/orgs/acme/packages?package_type=container&per_page=100";
        let package = serde_json::to_value(fixtures::package("acme", "widget")).unwrap();
        let client = client(FakeTransport::default().page(url, json!([package]), None));

        let packages = client.list_packages("acme").await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "widget");
    }

    #[tokio::test]
    async fn test_get_package_encodes_name() {
        let url = "https://api.github.com/orgs/acme/packages/container/tools%2Fwidget";
        let package = serde_json::to_value(fixtures::package("acme", "tools/widget")).unwrap();
        let client = client(FakeTransport::default().respond(Method::Get, url, 200, package));

        let package = client.get_package("acme", "tools/widget").await.unwrap();
        assert_eq!(package.name, "tools/widget");
    }

    #[tokio::test]
    async fn test_list_package_versions_attaches_package() {
        let page_1 = "https://api.github.com/orgs/acme/packages/container/widget/versions?per_page=100";
        let page_2 = "https://api.github.com/orgs/acme/packages/container/widget/versions?per_page=100&page=2";
        let package_url = "https://api.github.com/orgs/acme/packages/container/widget";
        let transport = FakeTransport::default()
            .page(page_1, json!([version_json(1, &["latest"])]), Some(page_2))
            .page(page_2, json!([version_json(2, &[])]), None)
            .respond(
                Method::Get,
                package_url,
                200,
                serde_json::to_value(fixtures::package("acme", "widget")).unwrap(),
            );
        let client = client(transport);

        let versions = client.list_package_versions("acme", "widget").await.unwrap();
        assert_eq!(versions.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1, 2]);
        for version in &versions {
            assert_eq!(version.package.as_ref().map(|p| p.name.as_str()), Some("widget"));
        }
        // One package lookup for the whole batch.
        let lookups = client
            .transport
            .requested()
            .into_iter()
            .filter(|(_, url)| url == package_url)
            .count();
        assert_eq!(lookups, 1);
    }

    #[tokio::test]
    async fn test_package_versions_method() {
        let versions_url = "https://api.github.com/orgs/acme/packages/container/widget/versions?per_page=100";
        let package = fixtures::package("acme", "widget");
        let transport = FakeTransport::default()
            .page(versions_url, json!([version_json(9, &[])]), None)
            .respond(
                Method::Get,
                "https://api.github.com/orgs/acme/packages/container/widget",
                200,
                serde_json::to_value(&package).unwrap(),
            );
        let client = client(transport);

        let versions = package.versions(&client).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id, 9);
    }

    #[tokio::test]
    async fn test_delete_package_version() {
        let url = "https://api.github.com/orgs/acme/packages/container/widget/versions/7";
        let mut transport = FakeTransport::default();
        transport.responses.insert(
            (Method::Delete, url.to_string()),
            RawResponse {
                status: 204,
                ..Default::default()
            },
        );
        let client = client(transport);

        client.delete_package_version("acme", "widget", 7).await.unwrap();
        assert_eq!(
            client.transport.requested(),
            vec![(Method::Delete, url.to_string())]
        );

        let error = client
            .delete_package_version("acme", "widget", 8)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Registry { status: 404, .. }));
    }
}
