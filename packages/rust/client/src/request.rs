//! Immutable description of a single API call.

use std::collections::BTreeMap;

use reqwest::Method;
use url::Url;

use gobracket_shared::{GoBracketError, Result};

/// `{method, path, query}` relative to the scheduler's base URL.
///
/// Builder methods consume `self`, so a request cannot change once it has
/// been handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: String,
    query: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Append a query parameter. Later values for the same key win.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Resolve against the API root. Path segments are appended to the base
    /// path rather than replacing its last segment.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined)
            .map_err(|e| GoBracketError::validation(format!("invalid request URL '{joined}': {e}")))?;

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_appends_to_base_path() {
        let base = Url::parse("https://online-go.com/api/v1").unwrap();
        let req = Request::get("tournaments/59567/rounds");
        assert_eq!(
            req.url(&base).unwrap().as_str(),
            "https://online-go.com/api/v1/tournaments/59567/rounds"
        );
    }

    #[test]
    fn url_encodes_query_pairs() {
        let base = Url::parse("https://online-go.com/api/v1/").unwrap();
        let req = Request::get("/players").query("username", "go player");
        assert_eq!(
            req.url(&base).unwrap().as_str(),
            "https://online-go.com/api/v1/players?username=go+player"
        );
    }

    #[test]
    fn query_is_sorted_and_deduplicated() {
        let req = Request::get("players")
            .query("b", 2)
            .query("a", 1)
            .query("b", 3);
        let pairs: Vec<_> = req.query_pairs().iter().collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], (&"a".to_string(), &"1".to_string()));
        assert_eq!(pairs[1], (&"b".to_string(), &"3".to_string()));
    }
}
