//! Navigation interception.
//!
//! Every navigation the renderer attempts is classified before it happens:
//! in-origin targets are served from the content root, everything else is
//! handed to the platform (external browser, deep link) or dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sprig_common::{IgnoreReason, LaunchError};
use sprig_config::schema::NavigationConfig;
use tracing::{debug, info, warn};

use crate::origin::VirtualOrigin;

/// What the renderer should do with a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Inside the virtual origin: continue into the resource provider.
    Serve,
    /// Handed to the platform; the renderer must not navigate.
    Delegate,
    /// Inert. The renderer must not navigate.
    Ignore(IgnoreReason),
}

impl NavigationDecision {
    pub fn is_ignore(self) -> bool {
        matches!(self, Self::Ignore(_))
    }

    /// Whether the renderer itself should proceed with the navigation.
    pub fn allows_renderer(self) -> bool {
        matches!(self, Self::Serve)
    }
}

/// An out-of-origin link in a form the platform can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTarget {
    url: String,
    scheme: String,
}

impl ExternalTarget {
    /// Parse `raw` as `scheme:rest`.
    ///
    /// Rejects empty input, whitespace or control characters, a missing or
    /// invalid scheme, and a scheme with nothing after it.
    pub fn parse(raw: &str) -> Result<Self, LaunchError> {
        let malformed = || LaunchError::MalformedTarget(raw.to_string());

        if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(malformed());
        }
        let (scheme, rest) = raw.split_once(':').ok_or_else(malformed)?;
        let mut chars = scheme.chars();
        let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme || rest.trim_start_matches('/').is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            url: raw.to_string(),
            scheme: scheme.to_ascii_lowercase(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lowercased scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }
}

/// Platform external-open intent.
///
/// Implementations must not block the caller on I/O.
pub trait ExternalOpener: Send + Sync {
    fn open(&self, target: &ExternalTarget) -> Result<(), LaunchError>;
}

/// Opens links with the desktop's default handler.
pub struct SystemOpener {
    schemes: Vec<String>,
    launcher: Option<PathBuf>,
}

impl SystemOpener {
    /// Handle `schemes` using the platform launcher found on `PATH`.
    pub fn new(schemes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::with_launcher(schemes, find_launcher())
    }

    pub fn from_config(config: &NavigationConfig) -> Self {
        Self::new(config.external_schemes.iter().cloned())
    }

    pub fn with_launcher(
        schemes: impl IntoIterator<Item = impl Into<String>>,
        launcher: Option<PathBuf>,
    ) -> Self {
        Self {
            schemes: schemes
                .into_iter()
                .map(|s| Into::<String>::into(s).to_ascii_lowercase())
                .collect(),
            launcher,
        }
    }

    pub fn handles(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

impl ExternalOpener for SystemOpener {
    fn open(&self, target: &ExternalTarget) -> Result<(), LaunchError> {
        let no_handler = || LaunchError::NoHandler {
            scheme: target.scheme().to_string(),
        };
        if !self.handles(target.scheme()) {
            return Err(no_handler());
        }
        let launcher = self.launcher.clone().ok_or_else(no_handler)?;

        let url = target.url().to_string();
        let spawned = std::thread::Builder::new()
            .name("sprig-open".into())
            .spawn(move || launch(&launcher, &url));
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn launcher thread");
            return Err(no_handler());
        }
        Ok(())
    }
}

fn launch(launcher: &Path, url: &str) {
    let mut command = std::process::Command::new(launcher);
    if cfg!(windows) {
        // `start` treats its first quoted argument as the window title.
        command.args(["/C", "start", "", url]);
    } else {
        command.arg(url);
    }
    match command.status() {
        Ok(status) if status.success() => debug!(url, "external link opened"),
        Ok(status) => warn!(url, %status, "launcher exited unsuccessfully"),
        Err(e) => warn!(url, error = %e, "failed to run launcher"),
    }
}

fn launcher_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(windows) {
        "cmd"
    } else {
        "xdg-open"
    }
}

/// Locate the platform launcher on `PATH`.
fn find_launcher() -> Option<PathBuf> {
    let name = launcher_name();
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| {
            let plain = dir.join(name);
            let exe = dir.join(format!("{name}.exe"));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

/// Classifies navigations for one virtual origin.
pub struct NavigationInterceptor {
    origin: VirtualOrigin,
    opener: Arc<dyn ExternalOpener>,
    allow_external: bool,
    blocked_schemes: Vec<String>,
}

impl NavigationInterceptor {
    pub fn new(origin: VirtualOrigin, opener: Arc<dyn ExternalOpener>) -> Self {
        Self::from_config(origin, opener, &NavigationConfig::default())
    }

    pub fn from_config(
        origin: VirtualOrigin,
        opener: Arc<dyn ExternalOpener>,
        config: &NavigationConfig,
    ) -> Self {
        Self {
            origin,
            opener,
            allow_external: config.allow_external,
            blocked_schemes: config
                .blocked_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn origin(&self) -> &VirtualOrigin {
        &self.origin
    }

    /// Decide what happens to a navigation to `target`.
    ///
    /// Never fails: launch errors are logged and turned into `Ignore`.
    pub fn should_handle(&self, target: &str) -> NavigationDecision {
        if self.origin.contains(target) {
            return NavigationDecision::Serve;
        }

        let external = match ExternalTarget::parse(target) {
            Ok(external) => external,
            Err(e) => return self.ignored(target, &e),
        };

        if self.blocked_schemes.iter().any(|s| s == external.scheme()) {
            debug!(url = %target, reason = IgnoreReason::BlockedScheme.as_str(), "navigation ignored");
            return NavigationDecision::Ignore(IgnoreReason::BlockedScheme);
        }
        if !self.allow_external {
            debug!(url = %target, reason = IgnoreReason::ExternalDisabled.as_str(), "navigation ignored");
            return NavigationDecision::Ignore(IgnoreReason::ExternalDisabled);
        }

        match self.opener.open(&external) {
            Ok(()) => {
                debug!(url = %target, "navigation delegated to platform");
                NavigationDecision::Delegate
            }
            Err(e) => self.ignored(target, &e),
        }
    }

    fn ignored(&self, target: &str, error: &LaunchError) -> NavigationDecision {
        let reason = match error {
            LaunchError::MalformedTarget(_) => {
                warn!(
                    url = %target,
                    reason = IgnoreReason::MalformedTarget.as_str(),
                    error = %error,
                    "navigation ignored"
                );
                IgnoreReason::MalformedTarget
            }
            LaunchError::NoHandler { .. } => {
                info!(
                    url = %target,
                    reason = IgnoreReason::NoHandler.as_str(),
                    error = %error,
                    "navigation ignored"
                );
                IgnoreReason::NoHandler
            }
        };
        NavigationDecision::Ignore(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Opener that records targets and only handles the schemes it is given.
    struct RecordingOpener {
        schemes: Vec<&'static str>,
        opened: Mutex<Vec<String>>,
    }

    impl RecordingOpener {
        fn new(schemes: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                schemes: schemes.to_vec(),
                opened: Mutex::new(Vec::new()),
            })
        }

        fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl ExternalOpener for RecordingOpener {
        fn open(&self, target: &ExternalTarget) -> Result<(), LaunchError> {
            if !self.schemes.iter().any(|s| *s == target.scheme()) {
                return Err(LaunchError::NoHandler {
                    scheme: target.scheme().to_string(),
                });
            }
            self.opened.lock().unwrap().push(target.url().to_string());
            Ok(())
        }
    }

    fn origin() -> VirtualOrigin {
        VirtualOrigin::new("app", "0.0.0.0", "/assets", "index.html")
            .with_alias("http://app.localhost/")
    }

    fn interceptor(opener: Arc<RecordingOpener>) -> NavigationInterceptor {
        NavigationInterceptor::new(origin(), opener)
    }

    // -- ExternalTarget parsing --

    #[test]
    fn parses_common_targets() {
        let t = ExternalTarget::parse("https://example.com/a?b=c").unwrap();
        assert_eq!(t.scheme(), "https");
        assert_eq!(t.url(), "https://example.com/a?b=c");
        assert_eq!(ExternalTarget::parse("mailto:me@example.com").unwrap().scheme(), "mailto");
        assert_eq!(ExternalTarget::parse("MyApp://deep/link").unwrap().scheme(), "myapp");
    }

    #[test]
    fn rejects_malformed_targets() {
        for raw in [
            "",
            "   ",
            "no-scheme-here",
            "://missing",
            "1http://example.com",
            "ht tp://example.com",
            "https://exa mple.com",
            "myapp:",
            "myapp://",
            "tab\there:x",
        ] {
            assert!(
                matches!(ExternalTarget::parse(raw), Err(LaunchError::MalformedTarget(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    // -- Decisions --

    #[test]
    fn origin_targets_are_served() {
        let opener = RecordingOpener::new(&["https"]);
        let nav = interceptor(opener.clone());
        assert_eq!(nav.should_handle("app://0.0.0.0/"), NavigationDecision::Serve);
        assert_eq!(nav.should_handle("app://0.0.0.0/counter?x=1"), NavigationDecision::Serve);
        assert_eq!(nav.should_handle("http://app.localhost/index.html"), NavigationDecision::Serve);
        assert!(opener.opened().is_empty());
    }

    #[test]
    fn external_targets_are_delegated() {
        let opener = RecordingOpener::new(&["https", "mailto"]);
        let nav = interceptor(opener.clone());
        assert_eq!(nav.should_handle("https://example.com/"), NavigationDecision::Delegate);
        assert_eq!(nav.should_handle("mailto:me@example.com"), NavigationDecision::Delegate);
        assert_eq!(opener.opened(), vec!["https://example.com/", "mailto:me@example.com"]);
    }

    #[test]
    fn out_of_origin_is_never_served() {
        let opener = RecordingOpener::new(&["https", "http", "app"]);
        let nav = interceptor(opener);
        for target in [
            "https://0.0.0.0/",
            "app://0.0.0.1/",
            "app://0.0.0.0.evil.com/index.html",
            "http://localhost/",
            "myapp://deep/link",
            "javascript:alert(1)",
            "",
        ] {
            assert_ne!(nav.should_handle(target), NavigationDecision::Serve, "{target}");
        }
    }

    #[test]
    fn unknown_scheme_is_ignored_as_no_handler() {
        let nav = interceptor(RecordingOpener::new(&["https"]));
        assert_eq!(
            nav.should_handle("myapp://deep/link"),
            NavigationDecision::Ignore(IgnoreReason::NoHandler)
        );
    }

    #[test]
    fn malformed_target_is_ignored() {
        let nav = interceptor(RecordingOpener::new(&["https"]));
        assert_eq!(
            nav.should_handle("not a link"),
            NavigationDecision::Ignore(IgnoreReason::MalformedTarget)
        );
    }

    #[test]
    fn blocked_schemes_never_reach_the_opener() {
        let opener = RecordingOpener::new(&["javascript", "data", "file"]);
        let nav = interceptor(opener.clone());
        for target in ["javascript:alert(1)", "data:text/html,<h1>x</h1>", "file:///etc/passwd"] {
            assert_eq!(
                nav.should_handle(target),
                NavigationDecision::Ignore(IgnoreReason::BlockedScheme)
            );
        }
        assert!(opener.opened().is_empty());
    }

    #[test]
    fn external_can_be_disabled() {
        let opener = RecordingOpener::new(&["https"]);
        let config = NavigationConfig {
            allow_external: false,
            ..Default::default()
        };
        let nav = NavigationInterceptor::from_config(origin(), opener.clone(), &config);
        assert_eq!(
            nav.should_handle("https://example.com/"),
            NavigationDecision::Ignore(IgnoreReason::ExternalDisabled)
        );
        assert_eq!(nav.should_handle("app://0.0.0.0/"), NavigationDecision::Serve);
        assert!(opener.opened().is_empty());
    }

    #[test]
    fn decision_helpers() {
        assert!(NavigationDecision::Serve.allows_renderer());
        assert!(!NavigationDecision::Delegate.allows_renderer());
        assert!(NavigationDecision::Ignore(IgnoreReason::NoHandler).is_ignore());
        assert!(!NavigationDecision::Delegate.is_ignore());
    }

    // -- SystemOpener --

    #[test]
    fn system_opener_rejects_unregistered_scheme() {
        let opener = SystemOpener::with_launcher(["http", "https"], Some(PathBuf::from("/bin/true")));
        let target = ExternalTarget::parse("myapp://deep/link").unwrap();
        assert_eq!(
            opener.open(&target),
            Err(LaunchError::NoHandler { scheme: "myapp".into() })
        );
    }

    #[test]
    fn system_opener_without_launcher_has_no_handler() {
        let opener = SystemOpener::with_launcher(["https"], None);
        let target = ExternalTarget::parse("https://example.com").unwrap();
        assert!(matches!(opener.open(&target), Err(LaunchError::NoHandler { .. })));
    }

    #[test]
    fn system_opener_scheme_match_is_case_insensitive() {
        let opener = SystemOpener::with_launcher(["HTTPS"], None);
        assert!(opener.handles("https"));
        assert!(!opener.handles("ftp"));
    }

    #[test]
    fn system_opener_from_config_uses_external_schemes() {
        let opener = SystemOpener::from_config(&NavigationConfig::default());
        for scheme in ["http", "https", "mailto", "tel"] {
            assert!(opener.handles(scheme));
        }
        assert!(!opener.handles("myapp"));
    }
}
