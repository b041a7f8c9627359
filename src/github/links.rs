use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};

static LINK_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*<([^>]*)>\s*;\s*rel="([^"]*)"\s*$"#).unwrap());

/// Parses a `link` header value (`<url>; rel="name", ...`) into a map from
/// relation name to url. Malformed entries are skipped.
pub fn parse_links(value: &str) -> HashMap<String, String> {
    let mut links = HashMap::new();
    for entry in value.split(',') {
        match LINK_ENTRY.captures(entry) {
            Some(captures) => {
                links.insert(captures[2].to_string(), captures[1].trim().to_string());
            }
            None => log::debug!("Ignoring malformed link entry {:?}", entry),
        }
    }
    links
}

/// Url of the next page advertised by the response headers, if any.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;
    parse_links(value).remove("next")
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn test_parse_links() {
        let links = parse_links(r#"<https://x/2>; rel="next", <https://x/1>; rel="prev""#);
        assert_eq!(links.len(), 2);
        assert_eq!(links["next"], "https://x/2");
        assert_eq!(links["prev"], "https://x/1");
    }

    #[test]
    fn test_parse_links_without_next() {
        let links = parse_links(
            r#"<https://api.github.com/orgs/acme/packages?page=1>; rel="first", <https://api.github.com/orgs/acme/packages?page=3>; rel="prev""#,
        );
        assert!(!links.contains_key("next"));
        assert_eq!(links["first"], "https://api.github.com/orgs/acme/packages?page=1");
    }

    #[test]
    fn test_parse_links_skips_malformed_entries() {
        let links = parse_links(r#"garbage, <https://x/2>; rel="next""#);
        assert_eq!(links.len(), 1);
        assert_eq!(links["next"], "https://x/2");
        assert!(parse_links("").is_empty());
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_link(&headers), None);

        headers.insert(
            LINK,
            HeaderValue::from_static(
                r#"<https://api.github.com/orgs/acme/packages?per_page=100&page=2>; rel="next", <https://api.github.com/orgs/acme/packages?per_page=100&page=5>; rel="last""#,
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/orgs/acme/packages?per_page=100&page=2")
        );
    }
}
