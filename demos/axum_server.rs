//! Axum server exposing the render and compression routes.
//!
//! Run with:
//!
//! ```bash
//! RUST_LOG=info cargo run --example axum_server --features axum-integration
//! ```
//!
//! Then:
//!
//! ```bash
//! curl -X POST localhost:8080/pdf/render \
//!      -H 'content-type: application/json' \
//!      -d '{"html":"<h1>Hello</h1>","options":{"format":"A4"}}' -o hello.pdf
//!
//! curl -X POST 'localhost:8080/pdf/compress?level=7' --data-binary @hello.pdf -o small.pdf
//! ```

use html2pdf_render::config::env;
use html2pdf_render::integrations::axum::router;
use html2pdf_render::prelude::*;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Reads app.env, then CHROME_PATH, RENDER_DEADLINE_SECONDS, ...
    let config = env::from_env()?;

    let service = PdfService::chrome(config).into_shared();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
    log::info!("Listening on http://127.0.0.1:8080");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl+c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => log::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutting down...");
}
