mod app;
mod cli;

use std::process::ExitCode;
use std::sync::Mutex;

use sprig_common::{BridgeError, ConfigError, SprigError};
use sprig_config::SprigConfig;
use sprig_webview::DispatchLoop;
use tracing_subscriber::EnvFilter;
use winit::event_loop::EventLoop;

use app::{SprigApp, UserEvent};

fn load_config(args: &cli::Args) -> Result<SprigConfig, ConfigError> {
    match &args.config {
        Some(path) => {
            let config = sprig_config::toml_loader::load_from_path(path)?;
            sprig_config::validation::validate(&config)?;
            Ok(config)
        }
        None => sprig_config::load_config(),
    }
}

/// `--log-level debug` means `sprig=debug`; full directives pass through.
fn log_directive(args: &cli::Args, config: &SprigConfig) -> String {
    match &args.log_level {
        Some(level) if level.contains('=') => level.clone(),
        Some(level) => format!("sprig={level}"),
        None => format!("sprig={}", config.logging.level.as_directive()),
    }
}

fn main() -> ExitCode {
    let args = cli::parse();

    // Logging depends on the config, so config errors are reported after.
    let loaded = load_config(&args);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_directive(&args, &config)))
        .unwrap_or_else(|_| EnvFilter::new("sprig=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Sprig v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    if let Err(e) = &loaded {
        tracing::warn!("Config load failed, using defaults: {e}");
    }

    if let Some(root) = &args.content_root {
        config.content.root = root.display().to_string();
    }
    if let Some(page) = &args.host_page {
        config.content.host_page = page.clone();
    }
    // WebView2 serves custom schemes from http://<scheme>.localhost/
    #[cfg(windows)]
    {
        let alias = format!("http://{}.localhost/", config.origin.scheme);
        config.origin.aliases.push(alias);
    }

    match run(config) {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Build the event loop, bind the dispatcher to it and run until exit.
fn run(config: SprigConfig) -> sprig_common::Result<()> {
    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .map_err(|e| SprigError::Other(format!("failed to create event loop: {e}")))?;

    let capacity = config.dispatcher.queue_capacity as usize;
    let (dispatch, dispatcher) = DispatchLoop::new(capacity).map_err(BridgeError::from)?;
    // Work queued from any thread wakes the event loop, which pumps it.
    let proxy = Mutex::new(event_loop.create_proxy());
    dispatcher.set_waker(move || {
        if let Ok(proxy) = proxy.lock() {
            let _ = proxy.send_event(UserEvent::Wake);
        }
    });

    let mut app = SprigApp::new(config, dispatch, dispatcher);

    tracing::info!("Entering event loop");
    event_loop
        .run_app(&mut app)
        .map_err(|e| SprigError::Other(format!("event loop error: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use sprig_config::schema::LogLevel;

    use super::*;

    #[test]
    fn bare_level_is_scoped_to_sprig() {
        let args = cli::Args::parse_from(["sprig", "--log-level", "debug"]);
        assert_eq!(log_directive(&args, &SprigConfig::default()), "sprig=debug");
    }

    #[test]
    fn full_directive_passes_through() {
        let args = cli::Args::parse_from(["sprig", "--log-level", "sprig_webview=trace"]);
        assert_eq!(
            log_directive(&args, &SprigConfig::default()),
            "sprig_webview=trace"
        );
    }

    #[test]
    fn config_level_is_the_fallback() {
        let args = cli::Args::parse_from(["sprig"]);
        let mut config = SprigConfig::default();
        config.logging.level = LogLevel::Warn;
        assert_eq!(log_directive(&args, &config), "sprig=warn");
    }
}
