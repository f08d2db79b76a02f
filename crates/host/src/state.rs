//! Per-transaction request/response state.
//!
//! A [`Transaction`] is created when one inbound request begins processing and
//! dropped when it finishes. It is exclusively owned by that transaction's
//! flow of control: nothing here is shared or synchronized, and no state
//! survives across requests. Every adapter operation takes the transaction
//! explicitly; there is no ambient lookup.

use bytes::{Bytes, BytesMut};
use http::request::Parts;
use http::{HeaderMap, Method, Request, StatusCode, Uri, Version, header};
use tracing::debug;

use crate::body::{BodyReader, BodyWriter};
use crate::error::HostError;
use crate::features::Features;
use crate::headers;
use crate::response::{ResponseBodyWriter, ResponseChannel, ResponseSink};

/// The state of one in-flight HTTP transaction, as seen by a guest.
///
/// Holds the request fields, the response channel (real or buffering writer,
/// chosen from the negotiated [`Features`] at construction) and the set of
/// enabled capabilities.
pub struct Transaction<S> {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    host: String,
    source_addr: String,
    body: BytesMut,
    channel: ResponseChannel<S>,
    features: Features,
}

impl<S> std::fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("host", &self.host)
            .field("source_addr", &self.source_addr)
            .field("body_bytes", &self.body.len())
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl<S: ResponseSink> Transaction<S> {
    /// Wraps an inbound request for guest access.
    ///
    /// The request's `Host` is pulled out of the header map here (preferring
    /// the URI authority, as for an absolute-form target) and synthesized back
    /// into lookups; it never remains a literal map entry. When `features`
    /// enables [`Features::BUFFER_RESPONSE`], a buffering writer backs the
    /// response so the guest can mutate it after the handler chain ran.
    pub fn new(request: Request<Bytes>, source_addr: impl Into<String>, features: Features, sink: S) -> Self {
        let (mut parts, body) = request.into_parts();
        let host = extract_host(&mut parts);

        let channel = if features.contains(Features::BUFFER_RESPONSE) {
            ResponseChannel::buffered(sink)
        } else {
            ResponseChannel::direct(sink)
        };

        debug!(method = %parts.method, uri = %parts.uri, features = %features, "transaction started");

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            host,
            source_addr: source_addr.into(),
            body: BytesMut::from(body.as_ref()),
            channel,
            features,
        }
    }

    // --- capability negotiation ------------------------------------------

    /// Records the requested capabilities on this transaction and returns the
    /// requested set unchanged; nothing is ever rejected.
    ///
    /// The response channel was fixed at construction: enabling
    /// [`Features::BUFFER_RESPONSE`] mid-flight does not retroactively buffer
    /// an unbuffered response.
    pub fn enable_features(&mut self, requested: Features) -> Features {
        self.features |= requested;
        requested
    }

    pub fn features(&self) -> Features {
        self.features
    }

    // --- request line ----------------------------------------------------

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Replaces the request method.
    ///
    /// Any token is accepted; a byte sequence that is not a valid token is a
    /// caller error.
    pub fn set_method(&mut self, method: &str) -> Result<(), HostError> {
        self.method = Method::from_bytes(method.as_bytes()).map_err(HostError::invalid_method)?;
        Ok(())
    }

    /// Reconstructs `path[?query]` from the request target.
    ///
    /// Returns `/` for an empty path. A target that explicitly carried a bare
    /// `?` keeps it, with an empty query string.
    pub fn uri(&self) -> String {
        let path = self.uri.path();
        let mut target = String::with_capacity(path.len().max(1));
        if path.is_empty() {
            target.push('/');
        } else {
            target.push_str(path);
        }
        if let Some(query) = self.uri.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// Replaces the request target.
    ///
    /// The empty string is a documented special case resetting the path to
    /// `/` and clearing any query. Anything else must parse as an origin-form
    /// or absolute-form request target; failure is a caller error.
    pub fn set_uri(&mut self, uri: &str) -> Result<(), HostError> {
        if uri.is_empty() {
            self.uri = Uri::from_static("/");
            return Ok(());
        }

        let parsed: Uri = uri.parse().map_err(HostError::invalid_uri)?;
        if !uri.starts_with('/') && parsed.scheme().is_none() {
            return Err(HostError::invalid_uri("request target must be origin or absolute form"));
        }
        self.uri = parsed;
        Ok(())
    }

    /// The request protocol, e.g. `HTTP/1.1`. Read-only.
    pub fn protocol_version(&self) -> String {
        format!("{:?}", self.version)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The transport source address, as an opaque string. Read-only.
    pub fn source_addr(&self) -> &str {
        &self.source_addr
    }

    // --- request headers and trailers ------------------------------------

    /// Distinct request header names, sorted, excluding trailer-namespaced
    /// entries. The synthetic `host` name is included while the request host
    /// is non-empty.
    pub fn request_header_names(&self) -> Vec<String> {
        let mut names = headers::header_names(&self.headers);
        if !self.host.is_empty() {
            names.push(header::HOST.as_str().to_owned());
            names.sort_unstable();
            names.dedup();
        }
        names
    }

    /// All values for a request header, case-insensitively.
    ///
    /// `host` is special-cased to the synthesized request host, returned as a
    /// single-element result regardless of header map contents.
    pub fn request_header_values(&self, name: &str) -> Vec<String> {
        if name.eq_ignore_ascii_case(header::HOST.as_str()) {
            return vec![self.host.clone()];
        }
        headers::header_values(&self.headers, name)
    }

    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::set_header(&mut self.headers, name, value)
    }

    pub fn add_request_header(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::add_header(&mut self.headers, name, value)
    }

    pub fn remove_request_header(&mut self, name: &str) {
        headers::remove_header(&mut self.headers, name);
    }

    pub fn request_trailer_names(&self) -> Vec<String> {
        headers::trailer_names(&self.headers)
    }

    pub fn request_trailer_values(&self, name: &str) -> Vec<String> {
        headers::trailer_values(&self.headers, name)
    }

    pub fn set_request_trailer(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::set_trailer(&mut self.headers, name, value)
    }

    pub fn add_request_trailer(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::add_trailer(&mut self.headers, name, value)
    }

    pub fn remove_request_trailer(&mut self, name: &str) {
        headers::remove_trailer(&mut self.headers, name);
    }

    // --- request body -----------------------------------------------------

    /// A readable stream over the current request body.
    ///
    /// The reader snapshots the body at this call; a later body replacement
    /// leaves an already-obtained reader stale.
    pub fn request_body_reader(&self) -> BodyReader {
        BodyReader::snapshot(Bytes::copy_from_slice(&self.body))
    }

    /// A fresh writable sink that replaces the request body.
    ///
    /// The previous body is discarded entirely, not appended to.
    pub fn request_body_writer(&mut self) -> BodyWriter<'_> {
        BodyWriter::reset(&mut self.body)
    }

    /// The current request body, for forwarding down the handler chain.
    pub fn request_body(&self) -> &[u8] {
        &self.body
    }

    // --- response ---------------------------------------------------------

    /// The buffered status (default 200) or the already-committed one.
    pub fn status_code(&self) -> StatusCode {
        self.channel.status()
    }

    /// Records the status while buffering, or commits it immediately when the
    /// response already flushes to the real writer. Once committed it can no
    /// longer change; the host does not guard against repeated commits.
    pub fn set_status_code(&mut self, status: StatusCode) -> Result<(), HostError> {
        self.channel.set_status(status)
    }

    /// Distinct response header names, sorted, trailer entries excluded.
    pub fn response_header_names(&self) -> Vec<String> {
        headers::header_names(self.channel.headers())
    }

    pub fn response_header_values(&self, name: &str) -> Vec<String> {
        headers::header_values(self.channel.headers(), name)
    }

    pub fn set_response_header(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::set_header(self.channel.headers_mut(), name, value)
    }

    pub fn add_response_header(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::add_header(self.channel.headers_mut(), name, value)
    }

    pub fn remove_response_header(&mut self, name: &str) {
        headers::remove_header(self.channel.headers_mut(), name);
    }

    pub fn response_trailer_names(&self) -> Vec<String> {
        headers::trailer_names(self.channel.headers())
    }

    pub fn response_trailer_values(&self, name: &str) -> Vec<String> {
        headers::trailer_values(self.channel.headers(), name)
    }

    pub fn set_response_trailer(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::set_trailer(self.channel.headers_mut(), name, value)
    }

    pub fn add_response_trailer(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        headers::add_trailer(self.channel.headers_mut(), name, value)
    }

    pub fn remove_response_trailer(&mut self, name: &str) {
        headers::remove_trailer(self.channel.headers_mut(), name);
    }

    /// A readable stream over the captured response body.
    ///
    /// Only available while a buffering writer backs the response.
    pub fn response_body_reader(&self) -> Result<BodyReader, HostError> {
        let body = self.channel.captured_body()?;
        Ok(BodyReader::snapshot(Bytes::copy_from_slice(body)))
    }

    /// A fresh writable sink replacing the response body.
    ///
    /// While buffering, the captured body is reset and later flushed as the
    /// final response body; otherwise writes stream through to the real
    /// writer.
    pub fn response_body_writer(&mut self) -> ResponseBodyWriter<'_, S> {
        self.channel.body_writer()
    }

    /// Finalizes the transaction's response and returns the sink.
    ///
    /// Buffered state is written out as status, headers, body, then trailers.
    pub fn finish(self) -> Result<S, HostError> {
        debug!(status = %self.channel.status(), "transaction finished");
        self.channel.finish()
    }
}

/// Pulls the request host out of the parts, per `Host` pseudo-header rules.
fn extract_host(parts: &mut Parts) -> String {
    let from_header = parts
        .headers
        .remove(header::HOST)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    match parts.uri.authority() {
        Some(authority) => authority.as_str().to_owned(),
        None => from_header.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseAssembler;
    use std::io::{Read, Write};

    fn transaction(request: Request<Bytes>, features: Features) -> Transaction<ResponseAssembler> {
        Transaction::new(request, "127.0.0.1:54321", features, ResponseAssembler::new())
    }

    fn empty_get(uri: &str) -> Request<Bytes> {
        Request::builder().method(Method::GET).uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn header_set_then_get_ignores_name_case() {
        let mut txn = transaction(empty_get("/"), Features::NONE);

        txn.set_request_header("X-Request-Id", "abc123").unwrap();
        assert_eq!(txn.request_header_values("x-request-id"), vec!["abc123"]);
        assert_eq!(txn.request_header_values("X-REQUEST-ID"), vec!["abc123"]);
    }

    #[test]
    fn uri_round_trips() {
        let mut txn = transaction(empty_get("/"), Features::NONE);

        txn.set_uri("/a/b?x=1").unwrap();
        assert_eq!(txn.uri(), "/a/b?x=1");

        txn.set_uri("").unwrap();
        assert_eq!(txn.uri(), "/");
    }

    #[test]
    fn set_uri_clears_previous_query() {
        let mut txn = transaction(empty_get("/old?keep=no"), Features::NONE);

        txn.set_uri("").unwrap();
        assert_eq!(txn.uri(), "/");

        txn.set_uri("/new").unwrap();
        assert_eq!(txn.uri(), "/new");
    }

    #[test]
    fn uri_preserves_explicit_empty_query() {
        let txn = transaction(empty_get("/search?"), Features::NONE);
        assert_eq!(txn.uri(), "/search?");
    }

    #[test]
    fn set_uri_rejects_garbage() {
        let mut txn = transaction(empty_get("/"), Features::NONE);

        let err = txn.set_uri("no-leading-slash").unwrap_err();
        assert!(err.is_caller_error());

        let err = txn.set_uri("http://exa mple.com/").unwrap_err();
        assert!(err.is_caller_error());

        // State is untouched after a failed set.
        assert_eq!(txn.uri(), "/");
    }

    #[test]
    fn set_uri_accepts_absolute_form() {
        let mut txn = transaction(empty_get("/"), Features::NONE);
        txn.set_uri("http://example.com/a?b=c").unwrap();
        assert_eq!(txn.uri(), "/a?b=c");
    }

    #[test]
    fn method_set_accepts_any_token() {
        let mut txn = transaction(empty_get("/"), Features::NONE);

        txn.set_method("PURGE").unwrap();
        assert_eq!(txn.method().as_str(), "PURGE");

        let err = txn.set_method("BAD METHOD").unwrap_err();
        assert!(err.is_caller_error());
    }

    #[test]
    fn protocol_version_is_exposed_as_string() {
        let txn = transaction(empty_get("/"), Features::NONE);
        assert_eq!(txn.protocol_version(), "HTTP/1.1");
    }

    #[test]
    fn status_defaults_to_200_when_never_set() {
        let txn = transaction(empty_get("/"), Features::BUFFER_RESPONSE);
        assert_eq!(txn.status_code(), StatusCode::OK);
    }

    #[test]
    fn body_replacement_and_stale_readers() {
        let request = Request::builder().method(Method::POST).uri("/").body(Bytes::from_static(b"original")).unwrap();
        let mut txn = transaction(request, Features::BUFFER_REQUEST);

        let mut before = txn.request_body_reader();

        txn.request_body_writer().write_all(b"replaced").unwrap();

        let mut replaced = String::new();
        txn.request_body_reader().read_to_string(&mut replaced).unwrap();
        assert_eq!(replaced, "replaced");

        // The earlier reader still sees the body it snapshotted.
        let mut original = String::new();
        before.read_to_string(&mut original).unwrap();
        assert_eq!(original, "original");
    }

    #[test]
    fn host_is_synthesized_not_stored() {
        let request =
            Request::builder().method(Method::GET).uri("/").header(header::HOST, "example.com").body(Bytes::new()).unwrap();
        let txn = transaction(request, Features::NONE);

        assert_eq!(txn.request_header_names(), vec!["host"]);
        assert_eq!(txn.request_header_values("Host"), vec!["example.com"]);
    }

    #[test]
    fn empty_request_enumerates_empty() {
        let txn = transaction(empty_get("/"), Features::NONE);
        assert!(txn.request_header_names().is_empty());
        assert!(txn.request_trailer_names().is_empty());
    }

    #[test]
    fn authority_wins_over_host_header() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("http://authority.example:8080/p")
            .header(header::HOST, "header.example")
            .body(Bytes::new())
            .unwrap();
        let txn = transaction(request, Features::NONE);

        assert_eq!(txn.request_header_values("host"), vec!["authority.example:8080"]);
    }

    #[test]
    fn request_trailers_round_trip() {
        let mut txn = transaction(empty_get("/"), Features::TRAILERS);

        txn.set_request_trailer("grpc-status", "0").unwrap();
        assert_eq!(txn.request_trailer_names(), vec!["grpc-status"]);
        assert_eq!(txn.request_trailer_values("grpc-status"), vec!["0"]);

        // add has replace-all semantics, not append.
        txn.add_request_trailer("grpc-status", "7").unwrap();
        assert_eq!(txn.request_trailer_values("grpc-status"), vec!["7"]);

        assert!(txn.request_header_names().is_empty());
    }

    #[test]
    fn header_names_are_sorted_with_host() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(header::HOST, "example.com")
            .header("zz-last", "1")
            .header("aa-first", "2")
            .body(Bytes::new())
            .unwrap();
        let txn = transaction(request, Features::NONE);

        assert_eq!(txn.request_header_names(), vec!["aa-first", "host", "zz-last"]);
    }

    #[test]
    fn buffered_response_cycle() {
        let mut txn = transaction(empty_get("/"), Features::BUFFER_RESPONSE);

        txn.set_status_code(StatusCode::ACCEPTED).unwrap();
        txn.set_response_header("content-type", "application/json").unwrap();
        txn.set_response_trailer("x-checksum", "abcd").unwrap();
        txn.response_body_writer().write_all(b"{}").unwrap();

        let mut captured = String::new();
        txn.response_body_reader().unwrap().read_to_string(&mut captured).unwrap();
        assert_eq!(captured, "{}");

        assert_eq!(txn.response_header_names(), vec!["content-type"]);
        assert_eq!(txn.response_trailer_names(), vec!["x-checksum"]);

        let response = txn.finish().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn unbuffered_response_body_reader_errors() {
        let txn = transaction(empty_get("/"), Features::NONE);
        let err = txn.response_body_reader().unwrap_err();
        assert!(matches!(err, HostError::ResponseNotBuffered));
    }

    #[test]
    fn enable_features_records_and_echoes() {
        let mut txn = transaction(empty_get("/"), Features::NONE);

        let granted = txn.enable_features(Features::TRAILERS);
        assert_eq!(granted, Features::TRAILERS);
        assert!(txn.features().contains(Features::TRAILERS));

        let granted = txn.enable_features(Features::BUFFER_REQUEST);
        assert_eq!(granted, Features::BUFFER_REQUEST);
        assert!(txn.features().contains(Features::TRAILERS | Features::BUFFER_REQUEST));
    }

    #[test]
    fn source_addr_is_opaque() {
        let txn = transaction(empty_get("/"), Features::NONE);
        assert_eq!(txn.source_addr(), "127.0.0.1:54321");
    }
}
