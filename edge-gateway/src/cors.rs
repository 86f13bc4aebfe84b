use lambda_http::http::{
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ORIGIN, VARY,
    },
    HeaderMap, HeaderValue,
};
use std::collections::HashSet;

/// Browser origins permitted to submit the form. Matching is exact.
#[derive(Debug, Clone, Default)]
pub struct AllowedOrigins(HashSet<String>);

impl AllowedOrigins {
    /// Parses a comma-separated list, ignoring blank entries.
    pub fn parse(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.0.contains(origin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Classifies the `Origin` header of an incoming request.
    pub fn classify<'a>(&self, headers: &'a HeaderMap) -> RequestOrigin<'a> {
        match headers.get(ORIGIN) {
            None => RequestOrigin::Absent,
            Some(value) if value.is_empty() => RequestOrigin::Absent,
            Some(value) => match value.to_str() {
                Ok(origin) if self.contains(origin) => RequestOrigin::Allowed(value),
                _ => RequestOrigin::Disallowed,
            },
        }
    }
}

impl<S: Into<String>> FromIterator<S> for AllowedOrigins {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Where a request says it comes from, relative to the allow-list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOrigin<'a> {
    /// No `Origin` header, as with server-to-server calls.
    Absent,
    Allowed(&'a HeaderValue),
    Disallowed,
}

impl RequestOrigin<'_> {
    /// CORS headers attached to every gateway response. The origin is echoed
    /// only when it is on the allow-list.
    pub fn response_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let RequestOrigin::Allowed(origin) = self {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, (*origin).clone());
        }
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        headers
    }
}
