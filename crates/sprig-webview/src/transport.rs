//! Port emulation for renderers that only move strings.
//!
//! Some platform webviews expose script evaluation and a single IPC
//! callback but no way to create or transfer a `MessagePort`. The shim
//! installed by [`TRANSPORT_JS`] gives content port-shaped objects backed by
//! numbered channels: host-to-content traffic is delivered by evaluating
//! [`deliver_script`], content-to-host traffic arrives on IPC as an
//! [`IpcEnvelope`].

use serde::{Deserialize, Serialize};
use sprig_common::BridgeError;

/// Initialization script. Must run before any page script.
pub const TRANSPORT_JS: &str = r#"
(function () {
    if (window.__sprigTransport) { return; }
    var ports = {};

    function makePort(id) {
        var handler = null;
        var queued = [];
        var port = {
            postMessage: function (message) {
                window.ipc.postMessage(JSON.stringify({ port: id, data: String(message) }));
            }
        };
        Object.defineProperty(port, 'onmessage', {
            get: function () { return handler; },
            set: function (fn) {
                handler = fn;
                if (handler) { queued.splice(0).forEach(function (m) { handler({ data: m }); }); }
            }
        });
        port.__push = function (message) {
            if (handler) { handler({ data: message }); } else { queued.push(message); }
        };
        ports[id] = port;
        return port;
    }

    if (!window.external) { window.external = {}; }

    window.__sprigTransport = {
        post: function (data, ids) {
            var event = new Event('message');
            event.data = data;
            event.ports = ids.map(makePort);
            window.dispatchEvent(event);
        },
        deliver: function (id, message) {
            var port = ports[id];
            if (port) { port.__push(message); }
        }
    };
})();
"#;

/// Content-to-host message as sent over IPC. `port` is absent for messages
/// on the default transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcEnvelope {
    #[serde(default)]
    pub port: Option<u64>,
    pub data: String,
}

impl IpcEnvelope {
    pub fn parse(body: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(body)
            .map_err(|e| BridgeError::Host(format!("malformed IPC envelope: {e}")))
    }
}

fn literal(value: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script that hands `message` to content port `port`.
pub fn deliver_script(port: u64, message: &str) -> String {
    format!("window.__sprigTransport.deliver({port}, {});", literal(message))
}

/// Script that posts `message` on the default transport, transferring
/// freshly created content ports `ports`.
pub fn post_script(message: &str, ports: &[u64]) -> String {
    let ids: Vec<String> = ports.iter().map(u64::to_string).collect();
    format!(
        "window.__sprigTransport.post({}, [{}]);",
        literal(message),
        ids.join(", ")
    )
}

/// Wrap `source` so its completion value, or the exception it throws, comes
/// back as a JSON object.
pub fn wrap_script(source: &str) -> String {
    format!(
        "(function () {{ try {{ return {{ ok: (0, eval)({}) }}; }} catch (e) {{ return {{ err: String(e) }}; }} }})();",
        literal(source)
    )
}

#[derive(Deserialize)]
struct ScriptOutcome {
    #[serde(default)]
    ok: Option<serde_json::Value>,
    #[serde(default)]
    err: Option<String>,
}

/// Unwrap the result of a [`wrap_script`]-wrapped evaluation into the
/// script's own JSON result.
pub fn decode_script_result(raw: &str) -> Result<String, BridgeError> {
    let outcome: ScriptOutcome = serde_json::from_str(raw)
        .map_err(|e| BridgeError::Script(format!("undecodable script result {raw:?}: {e}")))?;
    if let Some(err) = outcome.err {
        return Err(BridgeError::Script(err));
    }
    Ok(outcome.ok.unwrap_or(serde_json::Value::Null).to_string())
}
