use wolservice::metrics;
use wolservice::service::{DispatchError, Dispatcher};

use axum::body::Bytes;
use axum::extract;
use axum::http::Request;
use axum::http::StatusCode;
use axum::middleware;
use axum::response;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing;
use axum::Router;
use clap::Parser;
use log::{error, info};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn methods(app_state: extract::State<AppState>) -> response::Json<Value> {
    response::Json(json!({ "methods": app_state.dispatcher.methods() }))
}

async fn call(
    app_state: extract::State<AppState>,
    method: extract::Path<String>,
    body: Bytes,
) -> response::Result<response::Json<Value>> {
    let params: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Malformed payload: {}", e)))?
    };
    let dispatcher = app_state.dispatcher.clone();
    let method = method.0;
    // Name resolution and the socket send are blocking.
    let reply = tokio::task::spawn_blocking(move || dispatcher.dispatch(&method, &params))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", e)))?;
    match reply {
        Ok(reply) => Ok(response::Json(reply)),
        Err(e @ DispatchError::UnknownMethod(_)) => Err((
            StatusCode::NOT_FOUND,
            response::Json(json!({ "success": false, "error": e.to_string() })),
        )
            .into()),
        Err(e) => {
            error!("dispatch failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into())
        }
    }
}

async fn varz() -> response::Result<impl IntoResponse> {
    metrics::render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", e)).into())
}

async fn add_observability<B>(
    req: Request<B>,
    next: middleware::Next<B>,
) -> response::Result<Response> {
    let path = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let resp = next.run(req).await;
    // /service/sendWOL 200
    info!(
        "{request} {status}",
        request = path,
        status = resp.status().as_str(),
    );
    Ok(resp)
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "WOL_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: String,
}

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

fn app(dispatcher: Dispatcher) -> Router {
    let app_state = AppState {
        dispatcher: Arc::new(dispatcher),
    };
    Router::new()
        .route("/service", routing::get(methods))
        .route("/service/:method", routing::post(call))
        .route("/varz", routing::get(varz))
        .route_layer(middleware::from_fn(add_observability))
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let dispatcher = Dispatcher::standard();
    info!("Serving methods {:?}", dispatcher.methods());

    let addr: SocketAddr = args.http_addr.parse()?;
    info!("Starting server on {}...", addr);
    axum::Server::bind(&addr)
        .serve(app(dispatcher).into_make_service())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn serve() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app(Dispatcher::standard()).into_make_service());
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    // Returns the status code and body of a POST, whatever the status.
    async fn post(url: String, body: &'static str) -> (u16, String) {
        tokio::task::spawn_blocking(move || match ureq::post(&url).send_string(body) {
            Ok(resp) => (resp.status(), resp.into_string().unwrap()),
            Err(ureq::Error::Status(code, resp)) => (code, resp.into_string().unwrap()),
            Err(e) => panic!("request failed: {}", e),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_validate_over_http() {
        let base = serve();
        let (status, body) = post(
            format!("{}/service/validateMACFormat", base),
            r#"{"macAddress": "aa-bb-cc-dd-ee-ff"}"#,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"valid": true})
        );
    }

    #[tokio::test]
    async fn test_empty_body_counts_as_no_params() {
        let base = serve();
        let (status, body) = post(format!("{}/service/sendWOL", base), "").await;
        assert_eq!(status, 200);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"success": false, "error": "broadcastIP is required."})
        );
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_found() {
        let base = serve();
        let (status, body) = post(format!("{}/service/getBroadcastIP", base), "{}").await;
        assert_eq!(status, 404);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"success": false, "error": "Unknown method: getBroadcastIP"})
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_bad_request() {
        let base = serve();
        let (status, body) = post(format!("{}/service/sendWOL", base), "{not json").await;
        assert_eq!(status, 400);
        assert!(body.starts_with("Malformed payload"));
    }
}
