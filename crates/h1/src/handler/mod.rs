//! Request handlers for the server role.

use std::error::Error;
use std::future::Future;

use crate::protocol::{Request, Response};

/// Turns a request into a response.
///
/// Implemented for async functions and closures through [`make_handler`].
#[trait_variant::make(Handler: Send)]
pub trait LocalHandler {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, request: Request) -> Result<Response, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut, Err> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Err>> + Send,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    async fn call(&self, request: Request) -> Result<Response, Self::Error> {
        (self.f)(request).await
    }
}

pub fn make_handler<F, Fut, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Result<Response, Err>>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::convert::Infallible;

    async fn echo_target(request: Request) -> Result<Response, Infallible> {
        Ok(Response::new(StatusCode::OK).with_fixed_body(request.target().clone()))
    }

    #[tokio::test]
    async fn functions_are_handlers() {
        let handler = make_handler(echo_target);
        let response = Handler::call(&handler, Request::get("/ping")).await.unwrap();
        assert_eq!(&response.body().data()[..], b"/ping");
    }
}
