mod app;
mod clipboard;
mod commands;
mod config;
mod logging;
mod recording;
mod session;
mod setup;
mod ui;
mod upload;

#[tokio::main]
async fn main() {
    if let Err(e) = app::run().await {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
