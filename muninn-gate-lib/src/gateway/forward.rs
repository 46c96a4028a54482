use http::{Request, Response, StatusCode, Uri};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use tracing::warn;

type HttpClient = Client<HttpConnector, Incoming>;
type RespBody = BoxBody<bytes::Bytes, hyper::Error>;

/// Forwards admitted requests to the configured upstream over a shared
/// pooled client.
#[derive(Clone)]
pub struct Forwarder {
    client: HttpClient,
    upstream: String,
}

impl Forwarder {
    pub fn new(upstream: String) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, upstream }
    }

    /// Rewrite the request against the upstream authority and send it.
    /// Failures collapse to a 502 so a broken upstream never takes the
    /// gate down with it.
    pub async fn forward(&self, mut req: Request<Incoming>, peer: SocketAddr) -> Response<RespBody> {
        let pq = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let uri = match format!("http://{}{}", self.upstream, pq).parse::<Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                warn!(error = %e, "failed to build upstream uri");
                return bad_gateway();
            }
        };
        *req.uri_mut() = uri;

        append_forwarded_for(req.headers_mut(), peer);

        match self.client.request(req).await {
            Ok(resp) => resp.map(|b| b.boxed()),
            Err(e) => {
                warn!(error = %e, "upstream request failed");
                bad_gateway()
            }
        }
    }
}

/// Append the peer IP to `X-Forwarded-For`, preserving entries added by
/// proxies in front of us.
fn append_forwarded_for(headers: &mut http::HeaderMap, peer: SocketAddr) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name) {
        Some(existing) => {
            let Ok(prior) = existing.to_str() else {
                return;
            };
            format!("{prior}, {}", peer.ip())
        }
        None => peer.ip().to_string(),
    };
    if let Ok(hv) = HeaderValue::from_str(&value) {
        headers.insert(name, hv);
    }
}

fn bad_gateway() -> Response<RespBody> {
    let body = Full::new(bytes::Bytes::from("Bad Gateway"))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = StatusCode::BAD_GATEWAY;
    resp
}
