//! HTTP/1.1 JSON binding of the performer RPC contract
//!
//! | Method | Path                                   | Body                          |
//! |--------|----------------------------------------|-------------------------------|
//! | POST   | `/performer.v1.Performer/ExecuteTask`  | `TaskRequest` (base64 payload)|
//! | POST   | `/performer.v1.Performer/HealthCheck`  | `{}`                          |
//! | POST   | `/performer.v1.Performer/StartSync`    | `{}`                          |
//! | GET    | `/health`                              | -                             |
//! | GET    | `/metrics`                             | -                             |
//! | GET    | `/diagnostics`                         | -                             |
//!
//! RPC failures carry an [`RpcStatus`] body with the mapped HTTP status.

use crate::error::{RpcCode, RpcStatus};
use crate::server::{HealthCheckRequest, PerformerServer, StartSyncRequest};
use anyhow::{Context, Result};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use performer_types::TaskRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const EXECUTE_TASK_PATH: &str = "/performer.v1.Performer/ExecuteTask";
pub const HEALTH_CHECK_PATH: &str = "/performer.v1.Performer/HealthCheck";
pub const START_SYNC_PATH: &str = "/performer.v1.Performer/StartSync";

/// Serve until `shutdown` resolves
pub async fn serve<F>(server: Arc<PerformerServer>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let server = Arc::clone(&server);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(req, Arc::clone(&server))))
        }
    });

    let http = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {}", addr))?
        .serve(make_svc);

    info!("Performer listening on http://{}", addr);
    info!("RPC: {}, {}, {}", EXECUTE_TASK_PATH, HEALTH_CHECK_PATH, START_SYNC_PATH);
    info!("Endpoints: /health, /metrics, /diagnostics");

    if let Err(e) = http.with_graceful_shutdown(shutdown).await {
        error!("Performer server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}

pub async fn handle_request(
    req: Request<Body>,
    server: Arc<PerformerServer>,
) -> std::result::Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("Request: {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::POST, EXECUTE_TASK_PATH) => match read_json::<TaskRequest>(req).await {
            Ok(request) => match server.execute_task(request).await {
                Ok(response) => json_response(StatusCode::OK, &response),
                Err(status) => status_response(&status),
            },
            Err(status) => status_response(&status),
        },
        (&Method::POST, HEALTH_CHECK_PATH) => {
            // Body is ignored; the contract request is empty
            let response = server.health_check(HealthCheckRequest {}).await;
            json_response(StatusCode::OK, &response)
        }
        (&Method::POST, START_SYNC_PATH) => {
            let response = server.start_sync(StartSyncRequest {}).await;
            json_response(StatusCode::OK, &response)
        }
        (&Method::GET, "/health") => {
            let status = server.status();
            let code = if status.accepts_tasks() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json_response(
                code,
                &json!({
                    "status": status,
                    "uptime_seconds": server.health().uptime().as_secs(),
                    "last_check": server.health().last_result(),
                }),
            )
        }
        (&Method::GET, "/metrics") => text_response(StatusCode::OK, server.metrics().render_text()),
        (&Method::GET, "/diagnostics") => {
            // sysinfo refresh blocks
            let server = Arc::clone(&server);
            match tokio::task::spawn_blocking(move || server.diagnostics().render()).await {
                Ok(report) => text_response(StatusCode::OK, report),
                Err(e) => {
                    error!("Diagnostics collection failed: {}", e);
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "Diagnostics unavailable".to_string())
                }
            }
        }
        (_, EXECUTE_TASK_PATH | HEALTH_CHECK_PATH | START_SYNC_PATH | "/health" | "/metrics" | "/diagnostics") => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
        }
        _ => status_response(&RpcStatus::new(RpcCode::NotFound, format!("No route for {}", path))),
    };

    Ok(response)
}

async fn read_json<T: DeserializeOwned>(req: Request<Body>) -> std::result::Result<T, RpcStatus> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| RpcStatus::new(RpcCode::InvalidArgument, format!("Failed to read body: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RpcStatus::new(RpcCode::InvalidArgument, format!("Malformed request: {}", e)))
}

fn status_response(status: &RpcStatus) -> Response<Body> {
    let code = StatusCode::from_u16(status.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(code, status)
}

fn json_response<T: Serialize>(code: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = code;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Serialization failure".to_string())
        }
    }
}

fn text_response(code: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = code;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use performer_config::PerformerConfig;

    fn server() -> Arc<PerformerServer> {
        let server = Arc::new(PerformerServer::builder(PerformerConfig::default()).build());
        server.start();
        server
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_task_route() {
        let response = handle_request(
            post(EXECUTE_TASK_PATH, r#"{"task_id":"h1","payload":"aGVsbG8="}"#),
            server(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["task_id"], "h1");
        assert_eq!(body["result"], "aGVsbG8=");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_argument() {
        let response = handle_request(post(EXECUTE_TASK_PATH, "{"), server()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_start_sync_route() {
        let response = handle_request(post(START_SYNC_PATH, "{}"), server()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({}));
    }

    #[tokio::test]
    async fn test_unknown_route_and_wrong_method() {
        let missing = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let response = handle_request(missing, server()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let wrong = Request::builder().uri(EXECUTE_TASK_PATH).body(Body::empty()).unwrap();
        let response = handle_request(wrong, server()).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_route_renders_text() {
        let server = server();
        handle_request(
            post(EXECUTE_TASK_PATH, r#"{"task_id":"m1","payload":"eA=="}"#),
            Arc::clone(&server),
        )
        .await
        .unwrap();

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = handle_request(request, server).await.unwrap();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tasks_total 1"));
    }
}
