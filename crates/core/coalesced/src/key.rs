use std::fmt;

/// Identity of a logical read: request method plus normalized resource locator.
///
/// Two requests that only differ in method casing, the order of differently named
/// query parameters, a trailing slash or a fragment produce the same key. Repeated
/// parameters keep their relative order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RequestKey {
    method: String,
    locator: String,
}

impl RequestKey {
    pub fn new(method: &str, locator: &str) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            locator: normalize_locator(locator),
        }
    }

    /// Shorthand for a `GET` key
    pub fn get(locator: &str) -> Self {
        Self::new("GET", locator)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.locator)
    }
}

fn normalize_locator(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.split_once('#').map_or(raw, |(before, _)| before);
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw, ""),
    };

    let mut locator = match path.trim_end_matches('/') {
        "" => "/".to_string(),
        path => path.to_string(),
    };

    let mut params: Vec<(&str, Option<&str>)> = query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| match param.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (param, None),
        })
        .collect();

    if !params.is_empty() {
        params.sort_by(|(a, _), (b, _)| a.cmp(b));

        let query = params
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{name}={value}"),
                None => name.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&");

        locator.push('?');
        locator.push_str(&query);
    }

    locator
}
