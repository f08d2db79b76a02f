use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use mezzo_host::{Features, ResponseAssembler, Transaction};
use std::io::Write;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Plays the role of a guest module: inspect the request, then rewrite the
/// response the handler chain produced.
fn guest(txn: &mut Transaction<ResponseAssembler>) {
    info!(method = %txn.method(), uri = %txn.uri(), addr = txn.source_addr(), "guest sees request");

    txn.set_request_header("x-guest", "was-here").unwrap();

    // The handler already wrote a response; buffering lets the guest replace
    // all of it.
    txn.set_status_code(StatusCode::ACCEPTED).unwrap();
    txn.set_response_header("content-type", "text/plain").unwrap();
    txn.set_response_trailer("x-body-words", "2").unwrap();
    txn.response_body_writer().write_all(b"rewritten body").unwrap();
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let request = Request::builder()
        .method("POST")
        .uri("/orders?id=42")
        .header("host", "shop.example")
        .body(Bytes::from_static(b"{\"qty\": 1}"))
        .unwrap();

    let mut txn = Transaction::new(
        request,
        "127.0.0.1:61234",
        Features::BUFFER_RESPONSE | Features::TRAILERS,
        ResponseAssembler::new(),
    );

    // Pretend the handler chain ran and produced a response.
    txn.response_body_writer().write_all(b"handler body").unwrap();

    // Then the guest gets its turn.
    guest(&mut txn);

    let response = txn.finish().unwrap().into_response();
    info!(status = %response.status(), "flushed response");

    let collected = response.into_body().collect().await.unwrap();
    if let Some(trailers) = collected.trailers() {
        info!(?trailers, "trailers emitted after body");
    }
    info!(body = %String::from_utf8_lossy(&collected.to_bytes()), "final body");
}
