//! Request-filter chain for the HTTP protocol endpoint.
//!
//! Each stage inspects the request method and headers and either lets the
//! request continue (optionally contributing response headers) or answers
//! it directly. Stages run in order: origin validation, then authentication.
//! Headers contributed by earlier stages are applied to every response,
//! including a later stage's short-circuit.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use tracing::debug;

use super::HttpConfig;

/// Methods advertised to approved cross-origin callers.
pub const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";

/// Headers advertised to approved cross-origin callers.
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, Mcp-Session-Id, Mcp-Protocol-Version";

/// Result of running one stage, or the whole chain.
#[derive(Debug)]
pub enum FilterOutcome {
    /// Keep going; add these headers to the eventual response.
    Continue(HeaderMap),
    /// Stop here and send this response.
    ShortCircuit(Response),
}

/// One stage of the chain.
pub trait RequestFilter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn check(&self, method: &Method, headers: &HeaderMap) -> FilterOutcome;
}

// ============================================================================
// Origin validation
// ============================================================================

/// Rejects browsers calling from origins outside the allow-list.
#[derive(Debug, Clone, Default)]
pub struct OriginFilter {
    allowed: Vec<String>,
}

impl OriginFilter {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }
}

impl RequestFilter for OriginFilter {
    fn name(&self) -> &'static str {
        "origin"
    }

    fn check(&self, method: &Method, headers: &HeaderMap) -> FilterOutcome {
        if self.allowed.is_empty() {
            return FilterOutcome::Continue(HeaderMap::new());
        }

        let mut cors = HeaderMap::new();
        if let Some(origin) = headers.get(header::ORIGIN) {
            let permitted = origin
                .to_str()
                .map(|o| self.allowed.iter().any(|a| a == o))
                .unwrap_or(false);
            if !permitted {
                debug!(origin = ?origin, "Origin not allowed");
                return FilterOutcome::ShortCircuit(
                    (StatusCode::FORBIDDEN, "Forbidden").into_response(),
                );
            }

            cors.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            cors.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            cors.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            );
            cors.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static("Mcp-Session-Id"),
            );
            cors.insert(header::VARY, HeaderValue::from_static("Origin"));
        }

        // Preflight is answered here whether or not an Origin was sent.
        if method == Method::OPTIONS {
            let mut preflight = StatusCode::NO_CONTENT.into_response();
            preflight.headers_mut().extend(cors);
            return FilterOutcome::ShortCircuit(preflight);
        }

        FilterOutcome::Continue(cors)
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Requires `Authorization: Bearer <token>` when a token is configured.
#[derive(Clone, Default)]
pub struct AuthFilter {
    expected: Option<String>,
}

impl AuthFilter {
    pub fn new(token: Option<String>) -> Self {
        Self {
            expected: token.map(|t| format!("Bearer {}", t)),
        }
    }
}

impl std::fmt::Debug for AuthFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFilter")
            .field("expected", &self.expected.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RequestFilter for AuthFilter {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn check(&self, _method: &Method, headers: &HeaderMap) -> FilterOutcome {
        let Some(expected) = &self.expected else {
            return FilterOutcome::Continue(HeaderMap::new());
        };

        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if presented == Some(expected.as_str()) {
            return FilterOutcome::Continue(HeaderMap::new());
        }

        let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        FilterOutcome::ShortCircuit(response)
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Ordered list of filter stages.
#[derive(Default)]
pub struct FilterChain {
    stages: Vec<Box<dyn RequestFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in insertion order.
    pub fn with_stage(mut self, stage: impl RequestFilter + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Origin validation followed by authentication.
    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new()
            .with_stage(OriginFilter::new(config.allowed_origins.clone()))
            .with_stage(AuthFilter::new(config.auth_token.clone()))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage. A short-circuit response carries the headers
    /// accumulated before it.
    pub fn evaluate(&self, method: &Method, headers: &HeaderMap) -> FilterOutcome {
        let mut accumulated = HeaderMap::new();
        for stage in &self.stages {
            match stage.check(method, headers) {
                FilterOutcome::Continue(extra) => accumulated.extend(extra),
                FilterOutcome::ShortCircuit(mut response) => {
                    debug!(stage = stage.name(), status = %response.status(), "Request stopped by filter");
                    merge_missing(response.headers_mut(), accumulated);
                    return FilterOutcome::ShortCircuit(response);
                }
            }
        }
        FilterOutcome::Continue(accumulated)
    }
}

fn merge_missing(target: &mut HeaderMap, extra: HeaderMap) {
    let mut last = None;
    for (name, value) in extra {
        if let Some(name) = name {
            last = Some(name);
        }
        if let Some(name) = &last {
            if !target.contains_key(name) {
                target.insert(name.clone(), value);
            }
        }
    }
}

/// axum middleware running the chain in front of the protocol endpoint.
pub async fn apply_filters(
    State(chain): State<Arc<FilterChain>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match chain.evaluate(request.method(), request.headers()) {
        FilterOutcome::ShortCircuit(response) => response,
        FilterOutcome::Continue(extra) => {
            let mut response = next.run(request).await;
            merge_missing(response.headers_mut(), extra);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn chain(origins: &[&str], token: Option<&str>) -> FilterChain {
        FilterChain::from_config(&HttpConfig {
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
            auth_token: token.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(chain(&[], None).stage_names(), vec!["origin", "auth"]);
    }

    #[test]
    fn test_unconfigured_chain_passes_through() {
        let outcome = chain(&[], None).evaluate(
            &Method::POST,
            &headers(&[(header::ORIGIN, "https://anything.example")]),
        );
        match outcome {
            FilterOutcome::Continue(extra) => assert!(extra.is_empty()),
            other => panic!("expected Continue, got {:?}", other),
        }
    }

    #[test]
    fn test_disallowed_origin_is_forbidden() {
        let outcome = chain(&["https://ok.example"], None).evaluate(
            &Method::POST,
            &headers(&[(header::ORIGIN, "https://evil.example")]),
        );
        match outcome {
            FilterOutcome::ShortCircuit(response) => {
                assert_eq!(response.status(), StatusCode::FORBIDDEN)
            }
            other => panic!("expected ShortCircuit, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_origin_is_allowed() {
        let outcome = chain(&["https://ok.example"], None).evaluate(&Method::POST, &HeaderMap::new());
        assert!(matches!(outcome, FilterOutcome::Continue(_)));
    }

    #[test]
    fn test_allowed_origin_is_echoed() {
        let outcome = chain(&["https://ok.example"], None).evaluate(
            &Method::POST,
            &headers(&[(header::ORIGIN, "https://ok.example")]),
        );
        let FilterOutcome::Continue(extra) = outcome else {
            panic!("expected Continue");
        };
        assert_eq!(extra[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://ok.example");
        assert_eq!(extra[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
        let allowed = extra[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
        assert!(allowed.contains("Authorization"));
        assert!(allowed.contains("Mcp-Session-Id"));
    }

    #[test]
    fn test_preflight_skips_auth() {
        let outcome = chain(&["https://ok.example"], Some("secret")).evaluate(
            &Method::OPTIONS,
            &headers(&[(header::ORIGIN, "https://ok.example")]),
        );
        let FilterOutcome::ShortCircuit(response) = outcome else {
            panic!("expected ShortCircuit");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://ok.example"
        );
    }

    #[test]
    fn test_options_without_origin_is_answered_before_auth() {
        let outcome =
            chain(&["https://ok.example"], Some("secret")).evaluate(&Method::OPTIONS, &HeaderMap::new());
        let FilterOutcome::ShortCircuit(response) = outcome else {
            panic!("expected ShortCircuit");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[test]
    fn test_options_without_allow_list_reaches_auth() {
        let outcome = chain(&[], Some("secret")).evaluate(&Method::OPTIONS, &HeaderMap::new());
        assert!(matches!(
            outcome,
            FilterOutcome::ShortCircuit(ref r) if r.status() == StatusCode::UNAUTHORIZED
        ));
    }

    #[test]
    fn test_bearer_token_required() {
        let chain = chain(&[], Some("secret"));

        let missing = chain.evaluate(&Method::POST, &HeaderMap::new());
        assert!(matches!(
            missing,
            FilterOutcome::ShortCircuit(ref r) if r.status() == StatusCode::UNAUTHORIZED
        ));

        let wrong = chain.evaluate(
            &Method::POST,
            &headers(&[(header::AUTHORIZATION, "Bearer nope")]),
        );
        assert!(matches!(wrong, FilterOutcome::ShortCircuit(_)));

        let right = chain.evaluate(
            &Method::POST,
            &headers(&[(header::AUTHORIZATION, "Bearer secret")]),
        );
        assert!(matches!(right, FilterOutcome::Continue(_)));
    }

    #[test]
    fn test_rejection_keeps_earlier_headers() {
        let outcome = chain(&["https://ok.example"], Some("secret")).evaluate(
            &Method::POST,
            &headers(&[(header::ORIGIN, "https://ok.example")]),
        );
        let FilterOutcome::ShortCircuit(response) = outcome else {
            panic!("expected ShortCircuit");
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://ok.example"
        );
    }

    #[test]
    fn test_auth_debug_redacts_token() {
        let debug_str = format!("{:?}", AuthFilter::new(Some("hunter2".to_string())));
        assert!(!debug_str.contains("hunter2"));
    }
}
