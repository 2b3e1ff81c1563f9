#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sprig_common::LaunchError;
use sprig_config::SprigConfig;
use sprig_webview::navigation::ExternalTarget;
use sprig_webview::{BridgeManager, Dispatcher, ExternalOpener, LoopbackHost, Surface, UiThread};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const START_URL: &str = "app://0.0.0.0/";

/// Content root with a host page, a script and a stylesheet.
pub fn content_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), "<html><body>host</body></html>").unwrap();
    fs::write(dir.path().join("app.js"), "console.log('app');").unwrap();
    fs::create_dir_all(dir.path().join("css")).unwrap();
    fs::write(dir.path().join("css/site.css"), "body {}").unwrap();
    dir
}

/// Records every target instead of launching it.
#[derive(Default)]
pub struct RecordingOpener {
    pub opened: Mutex<Vec<String>>,
}

impl ExternalOpener for RecordingOpener {
    fn open(&self, target: &ExternalTarget) -> Result<(), LaunchError> {
        if target.scheme() != "https" {
            return Err(LaunchError::NoHandler {
                scheme: target.scheme().to_string(),
            });
        }
        self.opened.lock().unwrap().push(target.url().to_string());
        Ok(())
    }
}

pub struct Harness {
    // Field order is drop order: surfaces go before their UI thread.
    pub manager: BridgeManager<LoopbackHost>,
    pub opener: Arc<RecordingOpener>,
    pub root: TempDir,
    pub ui: UiThread,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SprigConfig::default())
    }

    pub fn with_config(config: SprigConfig) -> Self {
        let ui = UiThread::spawn("sprig-test-ui", 1024).unwrap();
        let opener = Arc::new(RecordingOpener::default());
        let manager = BridgeManager::with_opener(config, ui.dispatcher().clone(), opener.clone());
        Self {
            manager,
            opener,
            root: content_root(),
            ui,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.ui.dispatcher()
    }

    /// A surface whose content answers every `ping` with `pong`.
    pub fn ping_pong_surface(&self) -> Surface<LoopbackHost> {
        let dispatcher = self.dispatcher().clone();
        self.manager
            .create_surface(self.root.path(), "index.html", move |_| {
                Ok(LoopbackHost::new(dispatcher)
                    .with_app(|m| (m == "ping").then(|| "pong".to_string())))
            })
            .unwrap()
    }

    pub fn plain_surface(&self) -> Surface<LoopbackHost> {
        let dispatcher = self.dispatcher().clone();
        self.manager
            .create_surface(self.root.path(), "index.html", move |_| {
                Ok(LoopbackHost::new(dispatcher))
            })
            .unwrap()
    }

    /// Wait until everything queued so far, and what it queued, has run.
    pub async fn settle(&self) {
        for _ in 0..4 {
            self.dispatcher().invoke(|| ()).await.unwrap();
        }
    }
}

/// Route host-side content messages into a channel.
pub fn collect_messages(surface: &Surface<LoopbackHost>) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    surface.on_message(move |m| {
        let _ = tx.send(m);
    });
    rx
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
