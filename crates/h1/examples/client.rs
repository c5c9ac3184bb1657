use http::Uri;
use micro_h1::pool::{ConnectionPool, PoolConfig};
use micro_h1::protocol::{ReceiveOptions, Request};
use micro_h1::transport::Destination;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let uri: Uri = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/".into()).parse().expect("invalid uri");
    let destination = Destination::from_uri(&uri).expect("uri needs an http scheme and a host");
    let target = uri.path_and_query().map_or("/", |path| path.as_str()).to_owned();

    let pool = ConnectionPool::new(destination.clone(), PoolConfig::default());
    let request = Request::get(target).with_header("Host", destination.host.clone()).with_header("User-Agent", "micro-h1");

    for _ in 0..3 {
        match pool.send_request_and_receive_response(&request, &ReceiveOptions::default()).await {
            Ok(Some(response)) => {
                let body = response.body().data();
                info!(status = %response.status(), body = %String::from_utf8_lossy(&body), "response");
            }
            Ok(None) => break,
            Err(e) => error!(cause = %e, "request failed"),
        }
    }
    info!(counts = ?pool.connection_counts(), "done");

    pool.stop();
    pool.wait_terminated().await;
}
