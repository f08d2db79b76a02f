//! Response-side plumbing: the buffering writer, the real-writer seam and the
//! finalize step.
//!
//! A transaction's response goes through a [`ResponseChannel`], a tagged
//! variant decided once at transaction setup:
//!
//! - `Direct`: accessor calls land on the real writer immediately. The status
//!   commits on first set and body writes stream through.
//! - `Buffered`: a [`BufferedResponse`] captures status, headers and body so
//!   a guest running after the handler chain can still change any of them.
//!
//! The real writer is abstracted behind [`ResponseSink`]. Finalizing a
//! buffered channel writes status, then headers, then body to the sink, and
//! emits trailer-namespaced entries last, after the body, per standard
//! chunked-trailer semantics.

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use tracing::{debug, warn};

use crate::body::BodyWriter;
use crate::error::HostError;
use crate::headers;

/// The eventual real response writer.
///
/// Implementations receive the pieces of a response in wire order: status
/// first, then headers (mutated in place through [`headers_mut`]), then body
/// chunks, then trailers.
///
/// [`headers_mut`]: ResponseSink::headers_mut
pub trait ResponseSink {
    fn write_status(&mut self, status: StatusCode) -> Result<(), HostError>;

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_body(&mut self, chunk: Bytes) -> Result<(), HostError>;

    fn write_trailers(&mut self, trailers: HeaderMap) -> Result<(), HostError>;
}

impl<S: ResponseSink + ?Sized> ResponseSink for Box<S> {
    fn write_status(&mut self, status: StatusCode) -> Result<(), HostError> {
        (**self).write_status(status)
    }

    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_body(&mut self, chunk: Bytes) -> Result<(), HostError> {
        (**self).write_body(chunk)
    }

    fn write_trailers(&mut self, trailers: HeaderMap) -> Result<(), HostError> {
        (**self).write_trailers(trailers)
    }
}

/// Captured response state that stays mutable until flushed.
///
/// The status is `None` until explicitly set and reported as 200 to readers.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured status, defaulting to 200 when never set.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut BytesMut {
        &mut self.body
    }

    /// Writes the captured state to `sink`: status (default 200), headers,
    /// body, then stripped trailers.
    pub fn flush<S: ResponseSink>(mut self, sink: &mut S) -> Result<(), HostError> {
        let trailers = headers::split_trailers(&mut self.headers);

        let status = self.status();
        debug!(status = %status, body_bytes = self.body.len(), trailers = trailers.len(), "flushing buffered response");

        sink.write_status(status)?;

        let target = sink.headers_mut();
        let mut current = None;
        for (name, value) in self.headers.drain() {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                target.append(name.clone(), value);
            }
        }

        if !self.body.is_empty() {
            sink.write_body(self.body.freeze())?;
        }

        if !trailers.is_empty() {
            sink.write_trailers(trailers)?;
        }
        Ok(())
    }
}

/// The response-writer reference held by a transaction, real or buffering.
///
/// The variant is chosen once when the transaction is set up; accessor calls
/// dispatch on it instead of inspecting the concrete writer.
#[derive(Debug)]
pub enum ResponseChannel<S> {
    Direct { sink: S, committed: Option<StatusCode> },
    Buffered { buffered: BufferedResponse, sink: S },
}

impl<S: ResponseSink> ResponseChannel<S> {
    pub fn direct(sink: S) -> Self {
        Self::Direct { sink, committed: None }
    }

    pub fn buffered(sink: S) -> Self {
        Self::Buffered { buffered: BufferedResponse::new(), sink }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered { .. })
    }

    /// The buffered status (default 200) or the already-committed one.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Direct { committed, .. } => committed.unwrap_or(StatusCode::OK),
            Self::Buffered { buffered, .. } => buffered.status(),
        }
    }

    /// Records the status for later flush, or commits it immediately when the
    /// response is not buffered. A commit cannot be taken back; a repeated
    /// direct set is forwarded to the sink, which is free to ignore it.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), HostError> {
        match self {
            Self::Direct { sink, committed } => {
                sink.write_status(status)?;
                committed.get_or_insert(status);
                Ok(())
            }
            Self::Buffered { buffered, .. } => {
                buffered.set_status(status);
                Ok(())
            }
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            Self::Direct { sink, .. } => sink.headers(),
            Self::Buffered { buffered, .. } => buffered.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            Self::Direct { sink, .. } => sink.headers_mut(),
            Self::Buffered { buffered, .. } => buffered.headers_mut(),
        }
    }

    /// The captured body, available only while buffering.
    pub fn captured_body(&self) -> Result<&[u8], HostError> {
        match self {
            Self::Direct { .. } => Err(HostError::ResponseNotBuffered),
            Self::Buffered { buffered, .. } => Ok(buffered.body()),
        }
    }

    /// A writable sink replacing the response body.
    ///
    /// While buffering this resets the captured body; otherwise writes pass
    /// straight through to the real writer.
    pub fn body_writer(&mut self) -> ResponseBodyWriter<'_, S> {
        match self {
            Self::Direct { sink, .. } => ResponseBodyWriter::Direct(sink),
            Self::Buffered { buffered, .. } => ResponseBodyWriter::Buffered(BodyWriter::reset(buffered.body_mut())),
        }
    }

    /// Finalizes the channel and returns the sink.
    ///
    /// A buffered channel flushes its captured state. A direct channel has
    /// already written everything except trailers, which are drained out of
    /// the sink's header map and emitted now, after the body.
    pub fn finish(self) -> Result<S, HostError> {
        match self {
            Self::Buffered { buffered, mut sink } => {
                buffered.flush(&mut sink)?;
                Ok(sink)
            }
            Self::Direct { mut sink, .. } => {
                let trailers = headers::split_trailers(sink.headers_mut());
                if !trailers.is_empty() {
                    sink.write_trailers(trailers)?;
                }
                Ok(sink)
            }
        }
    }
}

/// Write handle returned by [`ResponseChannel::body_writer`].
#[derive(Debug)]
pub enum ResponseBodyWriter<'chan, S> {
    Buffered(BodyWriter<'chan>),
    Direct(&'chan mut S),
}

impl<S: ResponseSink> Write for ResponseBodyWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Buffered(writer) => writer.write(buf),
            Self::Direct(sink) => {
                sink.write_body(Bytes::copy_from_slice(buf)).map_err(io::Error::other)?;
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Buffered(writer) => writer.flush(),
            Self::Direct(_) => Ok(()),
        }
    }
}

/// A [`ResponseSink`] that assembles a complete [`http::Response`].
///
/// This is the stock real writer: it records everything it is given and turns
/// into a response whose body yields the data followed by a trailers frame.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    trailers: Option<HeaderMap>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_response(self) -> Response<TrailerBody> {
        let mut response = Response::new(TrailerBody::new(self.body.freeze(), self.trailers));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseSink for ResponseAssembler {
    fn write_status(&mut self, status: StatusCode) -> Result<(), HostError> {
        if self.status.is_some() {
            warn!(status = %status, "superfluous status write, already committed");
            return Ok(());
        }
        self.status = Some(status);
        Ok(())
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_body(&mut self, chunk: Bytes) -> Result<(), HostError> {
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    fn write_trailers(&mut self, trailers: HeaderMap) -> Result<(), HostError> {
        self.trailers = Some(trailers);
        Ok(())
    }
}

/// Response body that emits its data and then a trailers frame.
#[derive(Debug)]
pub struct TrailerBody {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
}

impl TrailerBody {
    pub fn new(data: Bytes, trailers: Option<HeaderMap>) -> Self {
        let data = if data.is_empty() { None } else { Some(data) };
        let trailers = trailers.filter(|map| !map.is_empty());
        Self { data, trailers }
    }
}

impl Body for TrailerBody {
    type Data = Bytes;
    type Error = HostError;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(data) = this.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match &self.data {
            Some(data) => SizeHint::with_exact(data.len() as u64),
            None => SizeHint::with_exact(0),
        }
    }
}
