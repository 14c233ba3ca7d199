//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CacheArgs, CacheClearArgs, CacheCommand, CacheOverride, CliArgs, Command, ConfigArgs,
    ConfigCommand, ConfigGetArgs, ContentOverrides, FeedArgs, RenderOverrides, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scribe";
const ENV_PREFIX: &str = "SCRIBE";
const DEFAULT_HOST: &str = "127.0.0.1";
/// The development port; any other port implies a live deployment unless `site.live` says otherwise.
pub const DEVELOPMENT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SITE_TITLE: &str = "Scribe";
const DEFAULT_POSTS_DIR: &str = "posts";
const DEFAULT_POST_URL_PREFIX: &str = "posts/";
const DEFAULT_POSTS_PER_PAGE: usize = 9;
const DEFAULT_CACHE_DIR: &str = "cache";
pub(crate) const DEFAULT_PYGMENTIZE_PATH: &str = "pygmentize";
pub(crate) const DEFAULT_PYGMENTS_STYLE: &str = "default";
pub(crate) const DEFAULT_DOT_PATH: &str = "dot";
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub posts: PostsSettings,
    pub cache: CacheSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub title: String,
    /// Absolute base URL, always ending in `/`.
    pub link: String,
    pub description: String,
    /// Production mode: the disk cache is consulted only when set.
    pub live: bool,
}

#[derive(Debug, Clone)]
pub struct PostsSettings {
    pub dir: PathBuf,
    /// Route prefix in front of every slug; empty or ending in `/`, never starting with one.
    pub url_prefix: String,
    pub per_page: NonZeroUsize,
    pub order: PostOrder,
}

/// How the post enumerator orders its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrder {
    /// Reverse lexical path order; file names are expected to sort chronologically.
    #[default]
    Path,
    /// Newest `date` field first; undated posts last.
    Date,
}

impl PostOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Date => "date",
        }
    }
}

impl FromStr for PostOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "date" => Ok(Self::Date),
            other => Err(format!("unknown order `{other}`, expected `path` or `date`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub pygmentize_path: PathBuf,
    pub pygments_style: String,
    pub dot_path: PathBuf,
    pub command_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Feed(args)) => raw.apply_content_overrides(&args.content),
        Some(Command::Cache(args)) => match &args.command {
            CacheCommand::Clear(clear) => raw.apply_cache_override(&clear.cache),
        },
        Some(Command::Config(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    posts: RawPostsSettings,
    cache: RawCacheSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(live) = overrides.site_live {
            self.site.live = Some(live);
        }

        self.apply_content_overrides(&overrides.content);
        self.apply_render_overrides(&overrides.render);
        self.apply_cache_override(&overrides.cache);
    }

    fn apply_content_overrides(&mut self, overrides: &ContentOverrides) {
        if let Some(dir) = overrides.posts_dir.as_ref() {
            self.posts.dir = Some(dir.clone());
        }
        if let Some(link) = overrides.site_link.as_ref() {
            self.site.link = Some(link.clone());
        }
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.pygmentize_path.as_ref() {
            self.render.pygmentize_path = Some(path.clone());
        }
        if let Some(path) = overrides.dot_path.as_ref() {
            self.render.dot_path = Some(path.clone());
        }
    }

    fn apply_cache_override(&mut self, overrides: &CacheOverride) {
        if let Some(dir) = overrides.cache_dir.as_ref() {
            self.cache.dir = Some(dir.clone());
        }
    }
}

impl Settings {
    /// Validate settings from an already-built configuration source.
    pub fn from_config(config: Config) -> Result<Self, LoadError> {
        let raw: RawSettings = config.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            site,
            posts,
            cache,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let site = build_site_settings(site, &server)?;
        let posts = build_posts_settings(posts)?;
        let cache = build_cache_settings(cache)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            server,
            logging,
            site,
            posts,
            cache,
            render,
        })
    }

    /// Resolved settings as a nested JSON tree keyed the same way as the config files.
    pub fn to_value(&self) -> Value {
        json!({
            "server": {
                "host": self.server.addr.ip().to_string(),
                "port": self.server.addr.port(),
                "graceful_shutdown_seconds": self.server.graceful_shutdown.as_secs(),
            },
            "logging": {
                "level": self.logging.level.to_string().to_ascii_lowercase(),
                "json": matches!(self.logging.format, LogFormat::Json),
            },
            "site": {
                "title": self.site.title,
                "link": self.site.link,
                "description": self.site.description,
                "live": self.site.live,
            },
            "posts": {
                "dir": self.posts.dir.display().to_string(),
                "url_prefix": self.posts.url_prefix,
                "per_page": self.posts.per_page.get(),
                "order": self.posts.order.as_str(),
            },
            "cache": {
                "dir": self.cache.dir.display().to_string(),
            },
            "render": {
                "pygmentize_path": self.render.pygmentize_path.display().to_string(),
                "pygments_style": self.render.pygments_style,
                "dot_path": self.render.dot_path.display().to_string(),
                "command_timeout_ms": self.render.command_timeout.as_millis() as u64,
            },
        })
    }

    /// Look up a resolved value by dotted key (`posts.per_page`). Whole sections resolve too.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        let mut current = self.to_value();
        for segment in key.split('.') {
            if segment.is_empty() {
                return None;
            }
            current = match current {
                Value::Object(mut map) => map.remove(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEVELOPMENT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(
    site: RawSiteSettings,
    server: &ServerSettings,
) -> Result<SiteSettings, LoadError> {
    let title = site
        .title
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string());

    let link = match site.link {
        Some(link) => {
            let trimmed = link.trim();
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                return Err(LoadError::invalid(
                    "site.link",
                    "must be an absolute http(s) URL",
                ));
            }
            normalize_base_link(trimmed)
        }
        None => format!("http://{}/", server.addr),
    };

    let live = site
        .live
        .unwrap_or(server.addr.port() != DEVELOPMENT_PORT);

    Ok(SiteSettings {
        title,
        link,
        description: site.description.unwrap_or_default().trim().to_string(),
        live,
    })
}

fn build_posts_settings(posts: RawPostsSettings) -> Result<PostsSettings, LoadError> {
    let dir = posts
        .dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_POSTS_DIR));
    if dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("posts.dir", "path must not be empty"));
    }

    let url_prefix = normalize_url_prefix(
        posts
            .url_prefix
            .as_deref()
            .unwrap_or(DEFAULT_POST_URL_PREFIX),
    );
    if url_prefix.contains(['?', '#']) {
        return Err(LoadError::invalid(
            "posts.url_prefix",
            "must not contain `?` or `#`",
        ));
    }

    let per_page = NonZeroUsize::new(posts.per_page.unwrap_or(DEFAULT_POSTS_PER_PAGE))
        .ok_or_else(|| LoadError::invalid("posts.per_page", "must be greater than zero"))?;

    let order = match posts.order {
        Some(order) => PostOrder::from_str(&order)
            .map_err(|reason| LoadError::invalid("posts.order", reason))?,
        None => PostOrder::default(),
    };

    Ok(PostsSettings {
        dir,
        url_prefix,
        per_page,
        order,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let dir = cache
        .dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("cache.dir", "path must not be empty"));
    }
    Ok(CacheSettings { dir })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let pygmentize_path = render
        .pygmentize_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PYGMENTIZE_PATH));
    if pygmentize_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.pygmentize_path",
            "path must not be empty",
        ));
    }

    let dot_path = render
        .dot_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOT_PATH));
    if dot_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.dot_path",
            "path must not be empty",
        ));
    }

    let pygments_style = render
        .pygments_style
        .map(|style| style.trim().to_string())
        .filter(|style| !style.is_empty())
        .unwrap_or_else(|| DEFAULT_PYGMENTS_STYLE.to_string());
    if pygments_style.contains([',', '=']) {
        return Err(LoadError::invalid(
            "render.pygments_style",
            "must not contain `,` or `=`",
        ));
    }

    let timeout_ms = render
        .command_timeout_ms
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "render.command_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RenderSettings {
        pygmentize_path,
        pygments_style,
        dot_path,
        command_timeout: Duration::from_millis(timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    live: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPostsSettings {
    dir: Option<PathBuf>,
    url_prefix: Option<String>,
    per_page: Option<usize>,
    order: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    pygmentize_path: Option<PathBuf>,
    pygments_style: Option<String>,
    dot_path: Option<PathBuf>,
    command_timeout_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn normalize_base_link(link: &str) -> String {
    format!("{}/", link.trim_end_matches('/'))
}

fn normalize_url_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
