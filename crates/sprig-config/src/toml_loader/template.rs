//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Sprig Configuration
# Only override what you want to change -- missing fields use defaults.

[origin]
# scheme = "app"
# host = "0.0.0.0"        # never resolved; an IP literal skips DNS
# aliases = []            # e.g. ["http://app.localhost/"]

[content]
# root = "wwwroot"
# host_page = "index.html"
# start_path = "/"
# cache_control = "no-cache, max-age=0, must-revalidate, no-store"

[navigation]
# allow_external = true
# external_schemes = ["http", "https", "mailto", "tel"]
# blocked_schemes = ["javascript", "data", "file", "blob", "about"]

[dispatcher]
# queue_capacity = 4096   # 1-1000000

[startup]
# started_flag = "__sprigStarted"
# start_script = "window.dispatchEvent(new Event('sprig:start'));"
# reload_on_pageshow = true

[surface]
# transparent = false
# devtools = false
# user_agent = "Sprig/0.1"
# clipboard = true
# autoplay = false

[logging]
# level = "info"          # trace, debug, info, warn, error
"##
    .to_string()
}
