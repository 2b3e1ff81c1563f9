use std::path::PathBuf;

use clap::Parser;

/// Sprig: serve bundled web content in a native window.
#[derive(Parser, Debug)]
#[command(name = "sprig", version, about)]
pub struct Args {
    /// Directory holding the bundled content (overrides `content.root`).
    #[arg(long)]
    pub content_root: Option<PathBuf>,

    /// Entry document, relative to the content root.
    #[arg(long)]
    pub host_page: Option<String>,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from([
            "sprig",
            "--content-root",
            "dist",
            "--host-page",
            "app.html",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.content_root, Some(PathBuf::from("dist")));
        assert_eq!(args.host_page.as_deref(), Some("app.html"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.config.is_none());
    }

    #[test]
    fn everything_is_optional() {
        let args = Args::parse_from(["sprig"]);
        assert!(args.content_root.is_none());
        assert!(args.host_page.is_none());
    }
}
