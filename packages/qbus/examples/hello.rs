//! Minimal round-trip: a hello worker answered over the in-process bus.
//!
//! Run with `cargo run --example hello`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use qbus::{handler_fn, AppIdentity, MemoryBus, Registry};

#[tokio::main]
async fn main() -> qbus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let registry = Arc::new(Registry::new(MemoryBus::new()).with_identity(AppIdentity::named("demo")));

    let hello = handler_fn(|ctx, subject, message| {
        let (headers, body) = qbus::decode(message);
        let body = body.unwrap_or_default();
        let text = format!(
            "[App: {}, Topic: {}, Trace {}] Hello {} from {}",
            headers.get("appName").map_or("?", String::as_str),
            subject,
            headers.get("traceId").map_or("?", String::as_str),
            String::from_utf8_lossy(&body),
            ctx.worker_id,
        );
        Ok(Some(Bytes::from(text)))
    });

    let handle = registry
        .create_topic_worker("demo.hello", hello, None)
        .await?;
    println!("worker bound: {}", handle.id());

    let reply = registry
        .request(Some("tid"), "demo.hello", b"Bob", Duration::from_millis(200), &[])
        .await?;
    println!("{}", String::from_utf8_lossy(&reply));

    registry.close_all().await
}
