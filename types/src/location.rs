//! Location descriptor for the host document.
//!
//! A `Location` is the URL-like snapshot delivered with every trigger event.
//! Parsing is tolerant: any string is accepted, and the pieces that look like
//! a query string or fragment are split off. Predicates classify pages by
//! inspecting this snapshot rather than re-reading the host.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Snapshot of the host's current location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Path portion, always starting with `/` (normalized on parse)
    pub path: String,

    /// Decoded query parameters. A bare key (`?flag`) maps to an empty value.
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Fragment after `#`, without the `#`
    #[serde(default)]
    pub fragment: Option<String>,
}

impl Location {
    /// Parse a raw location string (`/path?a=1&flag#frag`).
    ///
    /// Accepts full URLs as well; everything before the first `/` after a
    /// `://` scheme marker is discarded since features only classify on
    /// path, query, and fragment.
    pub fn parse(input: &str) -> Self {
        let mut rest = input.trim();

        // Strip scheme and authority if a full URL was handed over
        if let Some(idx) = rest.find("://") {
            let after = &rest[idx + 3..];
            rest = match after.find('/') {
                Some(slash) => &after[slash..],
                None => "/",
            };
        }

        let (rest, fragment) = match rest.split_once('#') {
            Some((r, f)) if !f.is_empty() => (r, Some(f.to_string())),
            Some((r, _)) => (r, None),
            None => (rest, None),
        };

        let (path, query_str) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        let mut query = BTreeMap::new();
        if let Some(q) = query_str {
            for pair in q.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => query.insert(k.to_string(), v.to_string()),
                    None => query.insert(pair.to_string(), String::new()),
                };
            }
        }

        let path = if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Self {
            path,
            query,
            fragment,
        }
    }

    /// True when the path matches exactly.
    pub fn path_is(&self, path: &str) -> bool {
        self.path == path
    }

    /// True when the path begins with the given prefix.
    pub fn path_starts_with(&self, prefix: &str) -> bool {
        self.path.starts_with(prefix)
    }

    /// True when the query contains the key, regardless of value.
    pub fn has_query(&self, key: &str) -> bool {
        self.query.contains_key(key)
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if !self.query.is_empty() {
            let mut first = true;
            for (k, v) in &self.query {
                write!(f, "{}{}", if first { '?' } else { '&' }, k)?;
                if !v.is_empty() {
                    write!(f, "={v}")?;
                }
                first = false;
            }
        }
        if let Some(frag) = &self.fragment {
            write!(f, "#{frag}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Location {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_only() {
        let loc = Location::parse("/issues/42");
        assert_eq!(loc.path, "/issues/42");
        assert!(loc.query.is_empty());
        assert_eq!(loc.fragment, None);
    }

    #[test]
    fn test_parse_query_and_fragment() {
        let loc = Location::parse("/search?q=rust&debug#results");
        assert_eq!(loc.path, "/search");
        assert_eq!(loc.query_value("q"), Some("rust"));
        assert!(loc.has_query("debug"));
        assert_eq!(loc.query_value("debug"), Some(""));
        assert_eq!(loc.fragment.as_deref(), Some("results"));
    }

    #[test]
    fn test_parse_full_url_strips_authority() {
        let loc = Location::parse("https://example.com/notifications?unread=1");
        assert_eq!(loc.path, "/notifications");
        assert_eq!(loc.query_value("unread"), Some("1"));
    }

    #[test]
    fn test_parse_bare_host() {
        let loc = Location::parse("https://example.com");
        assert_eq!(loc.path, "/");
    }

    #[test]
    fn test_display_round_trip() {
        let loc = Location::parse("/a/b?flag&x=1#frag");
        assert_eq!(Location::parse(&loc.to_string()), loc);
    }

    #[test]
    fn test_path_prefix() {
        let loc = Location::parse("/issues/42/comments");
        assert!(loc.path_starts_with("/issues"));
        assert!(!loc.path_is("/issues"));
    }
}
