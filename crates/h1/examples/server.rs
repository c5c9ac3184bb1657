use std::convert::Infallible;
use std::sync::Arc;

use http::StatusCode;
use micro_h1::connection::{ConnectionAcceptor, ConnectionConfig};
use micro_h1::handler::make_handler;
use micro_h1::protocol::{Request, Response};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

async fn hello_world(request: Request) -> Result<Response, Infallible> {
    info!(target = %String::from_utf8_lossy(request.target()), "request");

    let response = match &request.target()[..] {
        b"/chunked" => Response::new(StatusCode::OK).with_chunked_body(["Hello ", "World!\r\n"]),
        _ => Response::new(StatusCode::OK).with_header("Content-Type", "text/plain").with_fixed_body("Hello World!\r\n"),
    };
    Ok(response)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let acceptor = match ConnectionAcceptor::bind("127.0.0.1:8080", ConnectionConfig::default()).await {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let handler = Arc::new(make_handler(hello_world));
    loop {
        let connection = match acceptor.accept().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            match connection.serve(&*handler).await {
                Ok(()) => info!("finished process, connection shutdown"),
                Err(e) => error!("service has error, cause {}, connection shutdown", e),
            }
        });
    }
}
