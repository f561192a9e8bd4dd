use std::sync::Arc;

use falcon_web::{Dispatch, PoolLimits, Route, Router, TaskPoolServer};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let router = Arc::new(
        Router::builder()
            .route(Route::new("POST", "/echo", |req, rsp| {
                let body = req.body().unwrap_or(b"");
                let path = req.path_str().unwrap_or("<non-utf8>");
                let payload = format!(
                    r#"{{"path": {:?}, "bytes": {}}}"#,
                    path,
                    body.len()
                );
                rsp.content_type(b"application/json").body(payload.into_bytes());
                Dispatch::Done
            }))
            .build()
            .expect("route table"),
    );

    let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
    println!("listening on {}", listener.local_addr().unwrap());

    TaskPoolServer::new(listener, router, PoolLimits::default())
        .launch()
        .await;
}
