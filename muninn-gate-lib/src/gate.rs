use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::header::HeaderValue;
use tracing::debug;

use crate::config::{ExtractBy, LimitConfig};
use crate::key::{self, KeyExtractor, PeerAddr, XForwardedFor};
use crate::limit::{Admission, BucketStore};

type RespBody = BoxBody<bytes::Bytes, hyper::Error>;

/// Outcome of gating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A token was consumed; the request may proceed.
    Admitted,
    /// No client key could be extracted; the request is not limited.
    Bypassed,
    /// The client is out of tokens.
    Rejected,
}

impl Decision {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected)
    }
}

/// Per-client admission control for HTTP requests.
///
/// Owns the bucket store and the key extraction strategy. Wrap it in an
/// `Arc` and hand clones to every connection task.
pub struct Limiter {
    store: BucketStore,
    extractor: Box<dyn KeyExtractor>,
    retry_after: HeaderValue,
}

impl Limiter {
    /// Build a limiter with the extractor the configuration names.
    pub fn new(config: &LimitConfig) -> Self {
        match config.extract_by {
            ExtractBy::Peer => Self::with_extractor(config, PeerAddr),
            ExtractBy::Forwarded => Self::with_extractor(config, XForwardedFor),
        }
    }

    /// Build a limiter with a custom key extractor.
    pub fn with_extractor<E: KeyExtractor + 'static>(config: &LimitConfig, extractor: E) -> Self {
        let store =
            BucketStore::new(config.refill_every(), config.burst, config.effective_max_keys());
        let retry_after = retry_after_value(retry_after_secs(store.refill_every()));
        Self { store, extractor: Box::new(extractor), retry_after }
    }

    /// Check one request against its client's bucket.
    pub fn check<B>(&self, peer: SocketAddr, req: &Request<B>) -> Decision {
        let Some(ip) = self.extractor.extract(peer, req.headers()) else {
            return Decision::Bypassed;
        };

        match self.store.check(key::hash_key(ip)) {
            Admission::Granted { .. } => Decision::Admitted,
            Admission::Rejected => {
                debug!(client = %ip, method = %req.method(), path = req.uri().path(), "request rate limited");
                Decision::Rejected
            }
        }
    }

    /// Synthesize the response for a throttled request.
    pub fn too_many_requests(&self) -> Response<RespBody> {
        let body = Full::new(bytes::Bytes::from("Too Many Requests"))
            .map_err(|never| match never {})
            .boxed();
        let mut resp = Response::new(body);
        *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        resp.headers_mut().insert(hyper::header::RETRY_AFTER, self.retry_after.clone());
        resp
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store.tracked_keys()
    }

    /// Seconds advertised in the `Retry-After` header of rejections.
    pub fn retry_after_secs(&self) -> u64 {
        retry_after_secs(self.store.refill_every())
    }

    pub fn burst(&self) -> u32 {
        self.store.burst()
    }

    pub fn refill_every(&self) -> Duration {
        self.store.refill_every()
    }

    pub fn max_keys(&self) -> usize {
        self.store.max_keys()
    }
}

/// Upper-bound estimate of when one token is back: the refill interval
/// rounded up to whole seconds, plus one of slack.
fn retry_after_secs(refill_every: Duration) -> u64 {
    (refill_every.as_secs_f64().ceil() as u64).saturating_add(1)
}

fn retry_after_value(secs: u64) -> HeaderValue {
    HeaderValue::from_str(&secs.to_string()).unwrap_or_else(|_| HeaderValue::from_static("1"))
}

/// Hyper `Service` middleware that applies a [`Limiter`] ahead of an
/// inner service.
#[derive(Clone)]
pub struct RateLimited<S> {
    limiter: Arc<Limiter>,
    peer: SocketAddr,
    inner: S,
}

impl<S> RateLimited<S> {
    pub fn new(limiter: Arc<Limiter>, peer: SocketAddr, inner: S) -> Self {
        Self { limiter, peer, inner }
    }
}

impl<S, B> hyper::service::Service<Request<B>> for RateLimited<S>
where
    S: hyper::service::Service<Request<B>, Response = Response<RespBody>>,
    S::Future: Send + 'static,
{
    type Response = Response<RespBody>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        if self.limiter.check(self.peer, &req).is_rejected() {
            let resp = self.limiter.too_many_requests();
            return Box::pin(async move { Ok(resp) });
        }
        Box::pin(self.inner.call(req))
    }
}
