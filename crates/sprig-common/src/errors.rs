use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Why an out-of-origin navigation could not be handed to the platform.
///
/// Both variants are swallowed by the navigation interceptor and turned into
/// an ignored navigation; they stay distinct so logs can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("malformed navigation target: {0}")]
    MalformedTarget(String),

    #[error("no handler available for scheme '{scheme}'")]
    NoHandler { scheme: String },
}

/// Failure delivered through a dispatcher completion handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatched work panicked: {0}")]
    Panicked(String),

    #[error("surface is gone; the UI loop is no longer running")]
    SurfaceGone,

    #[error("dispatch queue is full ({capacity} items pending)")]
    QueueFull { capacity: usize },

    #[error("failed to start UI loop: {0}")]
    Runtime(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A programming error: double `establish`, `send` before the bridge is
    /// active, and similar misuse of the handshake protocol.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("content host error: {0}")]
    Host(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("surface is gone")]
    SurfaceGone,

    /// A new document started loading while the handshake ran; the new
    /// document gets its own handshake.
    #[error("handshake superseded by a new document")]
    Superseded,

    #[error("called off the UI thread: {0}")]
    WrongThread(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SprigError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("origin.host is empty".into());
        assert_eq!(
            err.to_string(),
            "config validation error: origin.host is empty"
        );
    }

    #[test]
    fn launch_error_variants_are_distinct() {
        let malformed = LaunchError::MalformedTarget("::".into());
        let no_handler = LaunchError::NoHandler {
            scheme: "myapp".into(),
        };
        assert_ne!(malformed, no_handler);
        assert_eq!(
            no_handler.to_string(),
            "no handler available for scheme 'myapp'"
        );
    }

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError::QueueFull { capacity: 8 };
        assert_eq!(err.to_string(), "dispatch queue is full (8 items pending)");

        let err = DispatchError::Panicked("boom".into());
        assert_eq!(err.to_string(), "dispatched work panicked: boom");
    }

    #[test]
    fn bridge_error_from_dispatch() {
        let err: BridgeError = DispatchError::SurfaceGone.into();
        assert!(matches!(err, BridgeError::Dispatch(DispatchError::SurfaceGone)));
        assert_eq!(
            err.to_string(),
            "surface is gone; the UI loop is no longer running"
        );
    }

    #[test]
    fn sprig_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: SprigError = config_err.into();
        assert!(matches!(err, SprigError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn sprig_error_from_bridge() {
        let bridge_err = BridgeError::ProtocolMisuse("send before active".into());
        let err: SprigError = bridge_err.into();
        assert!(matches!(err, SprigError::Bridge(_)));
        assert_eq!(err.to_string(), "protocol misuse: send before active");
    }

    #[test]
    fn sprig_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: SprigError = io_err.into();
        assert!(matches!(err, SprigError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
