//! Per-request context handed to handlers.
//!
//! Carries the route's path parameters, the request deadline and a
//! cancellation signal that fires when the deadline passes or the dispatcher
//! stops waiting. Cancellation is cooperative: handlers that never look at it
//! keep running.

use axum::extract::RawPathParams;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Named path segments captured by the matched route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the named parameter, if the route captured it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&RawPathParams> for PathParams {
    fn from(raw: &RawPathParams) -> Self {
        Self(
            raw.iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug)]
struct Inner {
    route: Arc<str>,
    params: PathParams,
    deadline: Instant,
    request_id: Option<String>,
    cancel: CancellationToken,
}

/// Context for one dispatched request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    pub fn new(
        route: Arc<str>,
        params: PathParams,
        deadline: Instant,
        request_id: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                route,
                params,
                deadline,
                request_id,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Full path of the matched route, prefix included.
    pub fn route_path(&self) -> &str {
        &self.inner.route
    }

    pub fn params(&self) -> &PathParams {
        &self.inner.params
    }

    /// Shorthand for `params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.inner.request_id.as_deref()
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.inner.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_lookup() {
        let params: PathParams = [("id", "42"), ("tab", "cards")].into_iter().collect();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("tab"), Some("cards"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_and_cancel() {
        let ctx = RequestContext::new(
            Arc::from("/svc/accounts"),
            PathParams::new(),
            Instant::now() + Duration::from_secs(2),
            None,
        );
        assert_eq!(ctx.remaining(), Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);

        let clone = ctx.clone();
        assert!(!clone.is_cancelled());
        ctx.cancel();
        clone.cancelled().await;
        assert!(clone.is_cancelled());
    }
}
