//! URL construction
//!
//! Joins a base URL with path segments and query parameters, escaping both.

use std::fmt;

use url::Url;

use crate::error::{ConnectorError, ConnectorResult};

/// Builder for request URLs.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    url: Url,
    query: Vec<(String, String)>,
}

impl UrlBuilder {
    /// Parse `base`; any query string it carries is kept.
    pub fn new(base: &str) -> ConnectorResult<Self> {
        let mut url = Url::parse(base)
            .map_err(|e| ConnectorError::invalid_config(format!("invalid URL '{base}': {e}")))?;
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.set_query(None);
        Ok(Self { url, query })
    }

    /// Append path segments. Each segment may itself contain `/`; empty
    /// segments and duplicate slashes are dropped.
    pub fn add_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = self.url.path().trim_end_matches('/').to_string();
        for segment in segments {
            for part in segment.as_ref().split('/').filter(|p| !p.is_empty()) {
                path.push('/');
                path.push_str(part);
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        self.url.set_path(&path);
        self
    }

    /// Append a query parameter, keeping existing ones with the same name.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a query parameter, replacing existing values with the same name.
    pub fn set_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.query.retain(|(k, _)| *k != key);
        self.query.push((key, value.into()));
        self
    }

    /// Remove a query parameter.
    pub fn remove_query(mut self, key: &str) -> Self {
        self.query.retain(|(k, _)| k != key);
        self
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn to_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        url
    }
}

impl fmt::Display for UrlBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_url().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path_segments() {
        let url = UrlBuilder::new("https://api.example.com/v1/")
            .unwrap()
            .add_path(["/crm/", "contacts"]);
        assert_eq!(url.to_string(), "https://api.example.com/v1/crm/contacts");
    }

    #[test]
    fn test_query_escaping() {
        let url = UrlBuilder::new("https://api.example.com")
            .unwrap()
            .add_path(["search"])
            .with_query("q", "a b&c")
            .with_query("limit", "10");
        assert_eq!(
            url.to_string(),
            "https://api.example.com/search?q=a+b%26c&limit=10"
        );
    }

    #[test]
    fn test_existing_query_is_kept_and_replaced() {
        let url = UrlBuilder::new("https://api.example.com/items?cursor=abc&limit=5")
            .unwrap()
            .set_query("cursor", "def");
        assert_eq!(url.query_value("limit"), Some("5"));
        assert_eq!(
            url.to_string(),
            "https://api.example.com/items?limit=5&cursor=def"
        );
    }

    #[test]
    fn test_parentheses_survive() {
        let url = UrlBuilder::new("https://api.example.com")
            .unwrap()
            .add_path(["/orders(42)"]);
        assert!(url.to_string().ends_with("/orders(42)"));
    }

    #[test]
    fn test_invalid_base() {
        assert!(matches!(
            UrlBuilder::new("not a url"),
            Err(ConnectorError::InvalidConfiguration { .. })
        ));
    }
}
