use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use micro_h1::connection::{ConnectionAcceptor, ConnectionConfig};
use micro_h1::handler::make_handler;
use micro_h1::pool::{ConnectionPool, PoolConfig, PoolEvent};
use micro_h1::protocol::{Body, HttpError, ReceiveOptions, Request, Response};
use micro_h1::transport::Destination;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn respond(request: Request) -> Result<Response, Infallible> {
    let response = match &request.target()[..] {
        b"/wiki" => Response::new(StatusCode::OK).with_chunked_body(["Wiki", "pedia"]),
        b"/slow" => {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Response::new(StatusCode::OK).with_fixed_body("slow")
        }
        _ => Response::new(StatusCode::OK).with_fixed_body("hello"),
    };
    Ok(response)
}

/// Serves `respond` on a loopback port; the counter tracks accepted connections.
async fn start_server() -> (SocketAddr, Arc<AtomicUsize>) {
    init_tracing();
    let acceptor = ConnectionAcceptor::bind("127.0.0.1:0", ConnectionConfig::default()).await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let handler = Arc::new(make_handler(respond));
        while let Ok(connection) = acceptor.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { connection.serve(&*handler).await });
        }
    });

    (addr, accepted)
}

fn pool(addr: SocketAddr, config: PoolConfig) -> ConnectionPool {
    ConnectionPool::new(Destination::new(addr.ip().to_string(), addr.port()), config)
}

fn get(target: &'static str) -> Request {
    Request::get(target).with_header("Host", "localhost")
}

#[tokio::test]
async fn simple_exchange() {
    let (addr, accepted) = start_server().await;
    let pool = pool(addr, PoolConfig::default());

    for _ in 0..3 {
        let response = pool.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body().data()[..], b"hello");
    }

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    pool.stop();
    pool.wait_terminated().await;
}

#[tokio::test]
async fn chunked_response() {
    let (addr, _) = start_server().await;
    let pool = pool(addr, PoolConfig::default());

    let response = pool.send_request_and_receive_response(&get("/wiki"), &ReceiveOptions::default()).await.unwrap().unwrap();

    assert!(response.body().is_chunked());
    assert_eq!(&response.body().data()[..], b"Wikipedia");
    match response.body() {
        Body::Chunked(chunks) => assert_eq!(chunks, &["Wiki", "pedia"]),
        body => panic!("unexpected body {body:?}"),
    }
}

#[tokio::test]
async fn exhausted_pool_waits_for_a_free_connection() {
    let (addr, accepted) = start_server().await;
    let pool = pool(addr, PoolConfig { max_connections: 1, ..Default::default() });

    let first = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.send_request_and_receive_response(&get("/slow"), &ReceiveOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = pool.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await;

    assert_eq!(&first.await.unwrap().unwrap().unwrap().body().data()[..], b"slow");
    assert_eq!(&second.unwrap().unwrap().body().data()[..], b"hello");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_pool_gives_up_at_the_deadline() {
    let (addr, _) = start_server().await;
    let config = PoolConfig { max_connections: 1, connect_timeout: Duration::from_millis(50), ..Default::default() };
    let pool = pool(addr, config);

    let _loaned = pool.get_connection_and_start_transaction().await.unwrap().unwrap();
    let e = pool.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await.unwrap_err();

    assert!(matches!(e, HttpError::MaxConnectionsReached { max: 1 }), "{e}");
}

#[tokio::test]
async fn connection_closed_by_the_server_is_replaced() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    // answers one request per connection, then closes it without saying so
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = vec![0; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        }
    });

    let pool = pool(addr, PoolConfig::default());
    for _ in 0..2 {
        let response = pool.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await.unwrap().unwrap();
        assert_eq!(&response.body().data()[..], b"ok");
        // let the close reach us
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(pool.connection_counts().total(), 1);
}

#[tokio::test]
async fn connect_failure_is_reported() {
    init_tracing();
    // bound and dropped, so nothing listens there
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let pool = pool(addr, PoolConfig::default());

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    pool.on_event(Arc::new(move |event: &PoolEvent<'_>| {
        if matches!(event, PoolEvent::ConnectionCreateFailed { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let e = pool.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await.unwrap_err();

    assert!(matches!(e, HttpError::Io { .. }), "{e}");
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(pool.connection_counts().total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn randomized_use_stays_within_the_limit() {
    const MAX: usize = 3;
    let (addr, accepted) = start_server().await;
    let pool = pool(addr, PoolConfig { max_connections: MAX, ..Default::default() });

    let tasks: Vec<_> = (0..8)
        .map(|seed| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut rng = fastrand::Rng::with_seed(seed);
                for _ in 0..20 {
                    match rng.u8(0..4) {
                        0 => {
                            if let Some(mut transaction) = pool.get_connection_and_start_transaction().await.unwrap() {
                                assert!(pool.connection_counts().total() <= MAX);
                                transaction.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await.unwrap();
                                let connection = transaction.connection().clone();
                                drop(transaction);
                                if rng.bool() {
                                    connection.terminate();
                                } else {
                                    assert!(pool.return_connection(&connection));
                                }
                            }
                        }
                        1 => {
                            if let Some(transaction) = pool.get_connection_and_start_transaction().await.unwrap() {
                                transaction.connection().terminate();
                            }
                        }
                        _ => {
                            pool.send_request_and_receive_response(&get("/"), &ReceiveOptions::default()).await.unwrap();
                        }
                    }
                    assert!(pool.connection_counts().total() <= MAX);
                    tokio::time::sleep(Duration::from_millis(rng.u64(0..3))).await;
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert!(pool.connection_counts().total() <= MAX);
    assert!(accepted.load(Ordering::SeqCst) >= 1);

    pool.stop();
    pool.wait_terminated().await;
    assert_eq!(pool.connection_counts().total(), 0);
}
