//! Host-side adapter exposing one in-flight HTTP transaction to embedded
//! middleware.
//!
//! An embedded middleware module (the "guest") cannot touch the network or
//! the runtime itself; it only calls a fixed, synchronous accessor API, and
//! this crate translates each call into a read or mutation of the live HTTP
//! request/response state: method, target URI, protocol version, headers and
//! trailers on both sides, status code, and both bodies.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, StatusCode};
//! use std::io::Write;
//! use mezzo_host::{Features, ResponseAssembler, Transaction};
//!
//! let request = Request::builder()
//!     .method("GET")
//!     .uri("/hello?name=world")
//!     .header("host", "example.com")
//!     .body(Bytes::new())
//!     .unwrap();
//!
//! // Buffer the response so the guest can still rewrite it after the
//! // handler chain produced one.
//! let mut txn = Transaction::new(
//!     request,
//!     "127.0.0.1:9000",
//!     Features::BUFFER_RESPONSE | Features::TRAILERS,
//!     ResponseAssembler::new(),
//! );
//!
//! // Guest calls, forwarded through the adapter surface.
//! assert_eq!(txn.uri(), "/hello?name=world");
//! assert_eq!(txn.request_header_values("Host"), vec!["example.com"]);
//!
//! txn.set_status_code(StatusCode::OK).unwrap();
//! txn.set_response_header("content-type", "text/plain").unwrap();
//! txn.set_response_trailer("x-checksum", "0").unwrap();
//! txn.response_body_writer().write_all(b"hello world").unwrap();
//!
//! // After the handler chain completes, flush the captured state: status,
//! // headers, body, then trailers.
//! let response = txn.finish().unwrap().into_response();
//! assert_eq!(response.status(), StatusCode::OK);
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`state`]: the per-transaction [`Transaction`] object and its accessor
//!   operations, the single entry point for guest calls
//! - [`response`]: the buffering response writer, the [`ResponseSink`] seam
//!   to the real writer, and the finalize step that emits trailers after the
//!   body
//! - [`headers`]: the header/trailer codec over the shared
//!   [`http::HeaderMap`] namespace
//! - [`body`]: in-memory body buffers with snapshot readers and resetting
//!   writers
//! - [`features`]: optional capability flags and their negotiation
//! - [`outbound`]: host-mediated outbound HTTP calls
//!
//! # Concurrency
//!
//! Exactly one [`Transaction`] exists per transaction and is owned by the
//! single flow of control processing it; no internal synchronization is
//! provided and none is needed. Only [`Outbound::call`] performs I/O, and it
//! completes before returning.
//!
//! # Limitations
//!
//! - Trailer `add` has replace-all semantics, identical to `set`
//! - Outbound calls do not forward caller-supplied request headers
//! - The response channel (buffered or direct) is fixed at transaction setup

pub mod body;
pub mod error;
pub mod features;
pub mod headers;
pub mod outbound;
pub mod response;
pub mod state;

pub use body::BodyReader;
pub use body::BodyWriter;
pub use error::HostError;
pub use features::Features;
pub use outbound::Outbound;
pub use outbound::OutboundResponse;
pub use response::BufferedResponse;
pub use response::ResponseAssembler;
pub use response::ResponseChannel;
pub use response::ResponseSink;
pub use response::TrailerBody;
pub use state::Transaction;
