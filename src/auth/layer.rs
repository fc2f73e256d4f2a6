use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use super::Authenticator;

/// Wraps a gRPC service so every call is authenticated before dispatch.
///
/// Tonic interceptors are synchronous, while the record store lookup is a
/// network round-trip, so authentication runs as a tower layer instead.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Authenticator,
}

impl AuthLayer {
    pub fn new(authenticator: Authenticator) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = RequireApiKey<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireApiKey {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

/// Service produced by [`AuthLayer`].
///
/// Rejected calls are answered with an `Unauthenticated` status without ever
/// reaching the inner service. Accepted calls carry the resolved
/// [`Principal`](super::Principal) in their request extensions.
#[derive(Clone)]
pub struct RequireApiKey<S> {
    inner: S,
    authenticator: Authenticator,
}

impl<S, B> Service<http::Request<B>> for RequireApiKey<S>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        // The readied service must be the one that handles this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authenticator = self.authenticator.clone();

        // Request bodies are not `Sync`; only the headers cross the await.
        let headers = request.headers().clone();

        Box::pin(async move {
            match authenticator.authenticate(&headers).await {
                Ok(principal) => {
                    let span = info_span!("rpc", auth.uid = %principal);
                    request.extensions_mut().insert(principal);
                    inner.call(request).instrument(span).await
                }
                Err(err) => Ok(Status::from(err).into_http()),
            }
        })
    }
}

impl<S: NamedService> NamedService for RequireApiKey<S> {
    const NAME: &'static str = S::NAME;
}
