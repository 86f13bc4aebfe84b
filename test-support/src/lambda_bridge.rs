use crate::serve;
use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use lambda_http::{Body, Request};
use std::future::Future;

/// Exposes a lambda handler over plain HTTP on an ephemeral port, so that one
/// component can call another the way it would in production. Returns the
/// base URL.
pub async fn serve_lambda_handler<HandlerT, FutureT>(handler: HandlerT) -> String
where
    HandlerT: Fn(Request) -> FutureT + Clone + Send + Sync + 'static,
    FutureT: Future<Output = Result<lambda_http::Response<Body>, lambda_http::Error>> + Send,
{
    let app = Router::new().fallback(move |method: Method, headers: HeaderMap, body: Bytes| {
        let handler = handler.clone();
        async move { invoke(handler, method, headers, body).await }
    });
    let addr = serve(app).await;
    format!("http://{addr}/")
}

async fn invoke<HandlerT, FutureT>(
    handler: HandlerT,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    HandlerT: Fn(Request) -> FutureT,
    FutureT: Future<Output = Result<lambda_http::Response<Body>, lambda_http::Error>>,
{
    let mut event = Request::new(if body.is_empty() {
        Body::Empty
    } else {
        Body::Binary(body.to_vec())
    });
    *event.method_mut() = method;
    *event.headers_mut() = headers;
    match handler(event).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            (parts.status, parts.headers, body.to_vec()).into_response()
        }
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response(),
    }
}
