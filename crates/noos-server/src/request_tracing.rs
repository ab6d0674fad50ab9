//! Request tracing middleware, grounded on the teacher's
//! `request_tracing.rs`: a `MakeRequestId` that stamps every request with an
//! id (here a `fastrand`-generated one, since this workspace has no `uuid`
//! dependency) and a `MakeSpan` that opens a tracing span carrying it plus
//! the method/path/status.

use axum::extract::Request;
use axum::http::HeaderValue;
use tower_http::request_id::{MakeRequestId, RequestId};
use tower_http::trace::MakeSpan;
use tracing::Span;

#[derive(Clone, Copy, Default)]
pub(crate) struct MakeRequestFastId;

impl MakeRequestId for MakeRequestFastId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = format!("{:016x}", fastrand::u64(..));
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

#[derive(Clone, Copy, Default)]
pub(crate) struct NoosMakeSpan;

impl<B> MakeSpan<B> for NoosMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id,
        )
    }
}
