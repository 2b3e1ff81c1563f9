//! Scripts injected into content during startup.

use sprig_common::BridgeError;
use sprig_config::schema::StartupConfig;

use crate::host::{Script, ScriptKind};

/// Sentinel posted on the default transport to hand content its port.
pub const CAPTURE_PORT: &str = "capturePort";

/// Content-side relay. Captures the port delivered with the sentinel and
/// binds `window.external.sendMessage` / `window.external.receiveMessage`.
///
/// Messages content sends before the port arrives are held and flushed onto
/// the port in order. Non-sentinel messages on the default transport are
/// still delivered to the receiver.
const RELAY_JS: &str = r#"
(function () {
    if (window.__sprigRelay) { return true; }
    var relay = window.__sprigRelay = { port: null, outbox: [], inbox: [], receiver: null };

    function deliver(data) {
        if (relay.receiver) { relay.receiver(data); } else { relay.inbox.push(data); }
    }

    window.addEventListener('message', function (event) {
        if (event.data === 'capturePort') {
            if (!relay.port && event.ports && event.ports[0]) {
                relay.port = event.ports[0];
                relay.port.onmessage = function (e) { deliver(e.data); };
                relay.outbox.splice(0).forEach(function (m) { relay.port.postMessage(m); });
            }
            return;
        }
        deliver(event.data);
    }, false);

    window.external.sendMessage = function (message) {
        if (relay.port) { relay.port.postMessage(message); } else { relay.outbox.push(message); }
    };
    window.external.receiveMessage = function (callback) {
        relay.receiver = callback;
        relay.inbox.splice(0).forEach(callback);
    };
    /*PAGESHOW*/
    return true;
})();
"#;

/// Pages restored from the back/forward cache keep stale ports; reload them.
const PAGESHOW_RELOAD_JS: &str = r#"window.addEventListener('pageshow', function (event) {
        if (event.persisted) { window.location.reload(); }
    });"#;

/// The three scripts of the startup handshake.
#[derive(Debug, Clone)]
pub struct StartupScripts {
    flag: String,
    start_script: String,
    reload_on_pageshow: bool,
}

impl StartupScripts {
    pub fn from_config(config: &StartupConfig) -> Self {
        Self {
            flag: config.started_flag.clone(),
            start_script: config.start_script.clone(),
            reload_on_pageshow: config.reload_on_pageshow,
        }
    }

    pub fn flag(&self) -> &str {
        &self.flag
    }

    fn flag_literal(&self) -> String {
        serde_json::to_string(&self.flag).unwrap_or_else(|_| "\"__sprigStarted\"".to_string())
    }

    /// Evaluates to `true` once content has been started.
    pub fn probe(&self) -> Script {
        Script::new(
            ScriptKind::ProbeStarted,
            format!(
                "(function () {{ return window[{}] === true; }})();",
                self.flag_literal()
            ),
        )
    }

    pub fn relay(&self) -> Script {
        let pageshow = if self.reload_on_pageshow {
            PAGESHOW_RELOAD_JS
        } else {
            ""
        };
        Script::new(ScriptKind::InstallRelay, RELAY_JS.replace("/*PAGESHOW*/", pageshow))
    }

    /// Starts the application, then sets the flag.
    pub fn start(&self) -> Script {
        Script::new(
            ScriptKind::StartApplication,
            format!(
                "(function () {{\n{}\nwindow[{}] = true;\nreturn true;\n}})();",
                self.start_script,
                self.flag_literal()
            ),
        )
    }
}

/// Decode a probe result. Anything other than JSON `true` means "not started".
pub fn decode_started(result: &str) -> Result<bool, BridgeError> {
    let value: serde_json::Value = serde_json::from_str(result)
        .map_err(|e| BridgeError::Script(format!("undecodable probe result {result:?}: {e}")))?;
    Ok(value == serde_json::Value::Bool(true))
}
