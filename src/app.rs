use std::{any::Any, net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    http::{header, Response, StatusCode},
    middleware::map_response,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Span;

use crate::config::ServerConfig;
use crate::error::{AppError, ErrorBody};
use crate::state::AppState;
use crate::{auth, images, projects};

pub fn build_app(state: AppState) -> Router {
    let server = &state.config.server;
    let cors = if server.cors_enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let api = Router::new()
        .merge(auth::router())
        .merge(projects::router())
        .merge(images::router(server.upload_max_bytes))
        .route("/health", get(|| async { "ok" }));

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        uri = %req.uri(),
                        request_id,
                        status = tracing::field::Empty,
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, ?latency, "response");
                    } else {
                        tracing::info!(%status, ?latency, "response");
                    }
                }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(cors);

    Router::new()
        .nest("/api/v1", api)
        .fallback(unknown_route)
        .with_state(state)
        .layer(middleware)
        .layer(map_response(error_envelope))
}

/// Gives error responses built outside the handlers (405 from the method
/// router, 408 from the timeout layer, plain-text extractor rejections) the
/// same `{error, code}` body as `AppError`.
async fn error_envelope(res: axum::response::Response) -> axum::response::Response {
    let status = res.status();
    let is_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json || !(status.is_client_error() || status.is_server_error()) {
        return res;
    }

    let (parts, body) = res.into_parts();
    let error = axum::body::to_bytes(body, 1024)
        .await
        .ok()
        .map(|b| String::from_utf8_lossy(&b).trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_lowercase()
        });

    let mut envelope = (
        status,
        Json(ErrorBody {
            error,
            code: status.as_u16(),
        }),
    )
        .into_response();
    for (name, value) in parts.headers.iter() {
        if *name != header::CONTENT_TYPE && *name != header::CONTENT_LENGTH {
            envelope.headers_mut().append(name.clone(), value.clone());
        }
    }
    envelope
}

async fn unknown_route() -> AppError {
    AppError::not_found("route not found")
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");

    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let body = ErrorBody {
        error: "internal error".into(),
        code: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

pub async fn serve(app: Router, cfg: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
