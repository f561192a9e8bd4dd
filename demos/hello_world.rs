use std::sync::Arc;

use falcon_web::{Dispatch, EngineLimits, EventLoop, Route, Router};

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().init();

    let router = Arc::new(
        Router::builder()
            .route(Route::new("GET", "/", |_req, rsp| {
                rsp.content_type(b"text/plain").body(b"Hello, world!".to_vec());
                Dispatch::Done
            }))
            .build()
            .expect("route table"),
    );

    let mut engine = EventLoop::bind(
        "127.0.0.1:8080".parse().unwrap(),
        router,
        EngineLimits::default(),
    )?;
    println!("listening on {}", engine.local_addr());
    engine.run()
}
