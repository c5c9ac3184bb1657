use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};
use indoc::indoc;
use micro_h1::connection::{ConnectionConfig, ConnectionEvent, HttpConnection};
use micro_h1::handler::make_handler;
use micro_h1::protocol::{Body, HttpError, LimitOverrides, MessagePart, ReceiveOptions, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn crlf(s: &str) -> Vec<u8> {
    s.replace('\n', "\r\n").into_bytes()
}

fn client() -> (HttpConnection, DuplexStream) {
    init_tracing();
    let (client, server) = tokio::io::duplex(64 * 1024);
    (HttpConnection::from_io(client, ConnectionConfig::default()), server)
}

/// Sends a GET, lets the peer answer with `wire` and receives the response.
async fn exchange(wire: &[u8], options: &ReceiveOptions) -> (HttpConnection, Result<Response, HttpError>) {
    let (connection, mut server) = client();
    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::get("/").with_header("Host", "localhost")).await.unwrap();

    let mut request = vec![0; 1024];
    let _ = server.read(&mut request).await.unwrap();
    server.write_all(wire).await.unwrap();

    let response = transaction.receive_response(options).await;
    drop(transaction);
    (connection, response)
}

#[tokio::test]
async fn chunked_response() {
    let wire = crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Type: text/plain
        Transfer-Encoding: chunked

        4
        Wiki
        6
        pedia 
        E
        in 

        chunks.
        0
        Expires: never

    "});

    let (connection, response) = exchange(&wire, &ReceiveOptions::default()).await;
    let response = response.unwrap();

    assert_eq!(&response.body().data()[..], b"Wikipedia in \r\n\r\nchunks.");
    match response.body() {
        Body::Chunked(chunks) => assert_eq!(chunks.len(), 3),
        body => panic!("unexpected body {body:?}"),
    }
    assert_eq!(response.trailers().get(&http::header::EXPIRES), Some(&Bytes::from_static(b"never")));
    assert!(!connection.is_terminated());
}

#[tokio::test]
async fn malformed_chunk_size_terminates() {
    let (connection, mut server) = client();
    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::get("/")).await.unwrap();

    server.write_all(&crlf("HTTP/1.1 200 OK\nTransfer-Encoding: chunked\n\nzz\nWiki\n0\n\n")).await.unwrap();

    let e = transaction.receive_response(&ReceiveOptions::default()).await.unwrap_err();
    assert!(matches!(e, HttpError::InvalidMessage { .. }), "{e}");
    assert!(connection.is_terminated());

    let e = transaction.send_request(&Request::get("/")).await.unwrap_err();
    assert!(matches!(e, HttpError::Disconnected), "{e}");

    drop(transaction);
    assert!(matches!(connection.try_start_transaction(), Err(HttpError::Disconnected)));
}

#[tokio::test]
async fn short_body_before_end_of_stream() {
    let (connection, mut server) = client();
    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::get("/")).await.unwrap();

    server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n12345678").await.unwrap();
    drop(server);

    let e = transaction.receive_response(&ReceiveOptions::default()).await.unwrap_err();
    assert!(matches!(e, HttpError::InvalidMessage { .. }), "{e}");
    assert!(connection.is_terminated());
}

#[tokio::test]
async fn caller_limits_win() {
    let options = ReceiveOptions {
        limits: LimitOverrides { max_body_size: Some(4), ..Default::default() },
        ..Default::default()
    };

    let (connection, response) = exchange(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello", &options).await;
    assert!(matches!(response, Err(HttpError::InvalidMessage { .. })));
    assert!(connection.is_terminated());

    let wire = crlf("HTTP/1.1 200 OK\nTransfer-Encoding: chunked\n\n3\nabc\n3\ndef\n0\n\n");
    match exchange(&wire, &options).await.1 {
        Err(HttpError::MessageTooLarge { part, limit, received, .. }) => {
            assert_eq!(part, MessagePart::Body);
            assert_eq!(limit, 4);
            assert_eq!(&received[..], b"abc");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn connection_limits_apply_without_caller_limits() {
    init_tracing();
    let config = ConnectionConfig {
        limits: LimitOverrides { max_start_line_size: Some(10), ..Default::default() },
        ..Default::default()
    };
    let (client, mut server) = tokio::io::duplex(1024);
    let connection = HttpConnection::from_io(client, config);
    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::get("/")).await.unwrap();

    server.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();

    match transaction.receive_response(&ReceiveOptions::default()).await {
        Err(HttpError::MessageTooLarge { part, received, .. }) => {
            assert_eq!(part, MessagePart::StartLine);
            assert_eq!(&received[..], b"HTTP/1.1 2");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_after_chunks() {
    let options = ReceiveOptions { disconnect_after_chunks: Some(1), ..Default::default() };
    let wire = crlf("HTTP/1.1 200 OK\nTransfer-Encoding: chunked\n\n4\nWiki\n5\npedia\n0\n\n");

    let (connection, response) = exchange(&wire, &options).await;

    assert_eq!(&response.unwrap().body().data()[..], b"Wiki");
    assert!(connection.is_terminated());
}

#[tokio::test]
async fn close_delimited_response() {
    let (connection, mut server) = client();
    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::get("/")).await.unwrap();

    server.write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nuntil the end").await.unwrap();
    drop(server);

    let response = transaction.receive_response(&ReceiveOptions::default()).await.unwrap();
    assert_eq!(&response.body().data()[..], b"until the end");

    drop(transaction);
    assert!(connection.is_terminated());
}

#[tokio::test]
async fn events_are_reported_in_order() {
    let (connection, mut server) = client();
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&events);
    connection.on_event(Arc::new(move |_: &HttpConnection, event: &ConnectionEvent<'_>| {
        let name = match event {
            ConnectionEvent::TransactionStarted => "started",
            ConnectionEvent::SendingRequest(_) => "sending",
            ConnectionEvent::RequestSent(_) => "sent",
            ConnectionEvent::ReceivingResponse => "receiving",
            ConnectionEvent::ResponseReceived(_) => "received",
            ConnectionEvent::TransactionEnded => "ended",
            ConnectionEvent::Terminated => "terminated",
            _ => "other",
        };
        recorder.lock().unwrap().push(name);
    }));

    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::get("/")).await.unwrap();
    server.write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await.unwrap();
    transaction.receive_response(&ReceiveOptions::default()).await.unwrap();
    drop(transaction);

    assert_eq!(*events.lock().unwrap(), ["started", "sending", "sent", "receiving", "received", "ended", "terminated"]);
}

#[tokio::test]
async fn serve_until_client_closes() {
    init_tracing();
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let connection = HttpConnection::from_io(server, ConnectionConfig::default());

    let handler = make_handler(|request: Request| async move {
        let body = format!("{} {}", request.method(), String::from_utf8_lossy(request.target()));
        Ok::<_, Infallible>(Response::new(StatusCode::OK).with_fixed_body(body))
    });
    let server = tokio::spawn(async move { connection.serve(&handler).await });

    client.write_all(&crlf("GET /a HTTP/1.1\nHost: x\n\nHEAD /b HTTP/1.1\nHost: x\n\n")).await.unwrap();
    client.shutdown().await.unwrap();

    server.await.unwrap().unwrap();
    let mut responses = String::new();
    client.read_to_string(&mut responses).await.unwrap();

    assert_eq!(
        responses,
        "HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nGET /aHTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\n"
    );
}

#[tokio::test]
async fn serve_honours_connection_close() {
    init_tracing();
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let connection = HttpConnection::from_io(server, ConnectionConfig::default());

    let handler = make_handler(|_request: Request| async { Ok::<_, Infallible>(Response::new(StatusCode::NO_CONTENT)) });
    let serving = connection.clone();
    let server = tokio::spawn(async move { serving.serve(&handler).await });

    client.write_all(&crlf("GET / HTTP/1.1\nConnection: close\n\nGET /ignored HTTP/1.1\n\n")).await.unwrap();

    server.await.unwrap().unwrap();
    let mut responses = String::new();
    client.read_to_string(&mut responses).await.unwrap();

    assert_eq!(responses, "HTTP/1.1 204 No Content\r\n\r\n");
    assert!(connection.is_terminated());
}

#[tokio::test]
async fn head_request_round_trip() {
    let (connection, mut server) = client();
    let mut transaction = connection.try_start_transaction().unwrap();
    transaction.send_request(&Request::new(Method::HEAD, "/")).await.unwrap();

    server.write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n").await.unwrap();
    let response = transaction.receive_response(&ReceiveOptions::default()).await.unwrap();

    assert!(response.body().is_empty());
    drop(transaction);
    assert!(!connection.is_terminated());
}
