// SPDX-License-Identifier: MIT OR Apache-2.0
//! Logical request inputs and the encodable contracts their parts satisfy.

/// Contributes query-string parameters to an encoded request.
pub trait QueryEncodable {
    /// Ordered key/value pairs, percent-encoded later by the encoder.
    fn query_pairs(&self) -> Vec<(String, String)>;
}

impl QueryEncodable for () {
    fn query_pairs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl QueryEncodable for Vec<(String, String)> {
    fn query_pairs(&self) -> Vec<(String, String)> {
        self.clone()
    }
}

/// Contributes path-template substitutions to an encoded request.
///
/// Each pair `(name, value)` replaces a `{name}` placeholder in the
/// operation's HTTP path.
pub trait PathEncodable {
    /// Placeholder substitutions.
    fn path_segments(&self) -> Vec<(String, String)>;
}

impl PathEncodable for () {
    fn path_segments(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl PathEncodable for Vec<(String, String)> {
    fn path_segments(&self) -> Vec<(String, String)> {
        self.clone()
    }
}

/// Contributes additional request headers.
pub trait HeadersEncodable {
    /// Ordered header name/value pairs.
    fn header_pairs(&self) -> Vec<(String, String)>;
}

impl HeadersEncodable for () {
    fn header_pairs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl HeadersEncodable for Vec<(String, String)> {
    fn header_pairs(&self) -> Vec<(String, String)> {
        self.clone()
    }
}

/// The caller-facing shape of one logical request.
///
/// Any subset of the parts may be absent; `()` stands in for parts an
/// operation never uses. Bodies are any `serde::Serialize` type.
#[derive(Debug, Clone)]
pub struct RequestInput<Q = (), P = (), B = (), H = ()> {
    /// Query-string contribution.
    pub query: Option<Q>,
    /// Path-template substitutions.
    pub path: Option<P>,
    /// Request body, JSON-encoded by the JSON codec.
    pub body: Option<B>,
    /// Extra headers beyond the transport's standard set.
    pub additional_headers: Option<H>,
    /// Literal appended to the substituted path.
    pub path_postfix: Option<String>,
}

// Manual impl: the derive would demand `Default` of the part types.
impl<Q, P, B, H> Default for RequestInput<Q, P, B, H> {
    fn default() -> Self {
        Self {
            query: None,
            path: None,
            body: None,
            additional_headers: None,
            path_postfix: None,
        }
    }
}

/// Input with only a body part.
pub type BodyRequestInput<B> = RequestInput<(), (), B, ()>;

impl RequestInput {
    /// An input with every part absent.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl<B> BodyRequestInput<B> {
    /// An input carrying only a body.
    #[must_use]
    pub fn body_only(body: B) -> Self {
        Self {
            query: None,
            path: None,
            body: Some(body),
            additional_headers: None,
            path_postfix: None,
        }
    }
}

impl<Q, P, B, H> RequestInput<Q, P, B, H> {
    /// Set the query part.
    #[must_use]
    pub fn with_query(mut self, query: Q) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the path-substitution part.
    #[must_use]
    pub fn with_path(mut self, path: P) -> Self {
        self.path = Some(path);
        self
    }

    /// Set the body part.
    #[must_use]
    pub fn with_body(mut self, body: B) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the additional-headers part.
    #[must_use]
    pub fn with_additional_headers(mut self, headers: H) -> Self {
        self.additional_headers = Some(headers);
        self
    }

    /// Set the path postfix.
    #[must_use]
    pub fn with_path_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.path_postfix = Some(postfix.into());
        self
    }
}
