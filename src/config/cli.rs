use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Scribe binary.
#[derive(Debug, Parser)]
#[command(name = "scribe", version, about = "Scribe blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCRIBE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Write the RSS feed to a file or stdout.
    Feed(FeedArgs),
    /// Manage the rendered-response cache.
    Cache(CacheArgs),
    /// Inspect the resolved configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ContentOverrides {
    /// Override the directory holding post files.
    #[arg(long = "posts-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub posts_dir: Option<PathBuf>,

    /// Override the site's public base link.
    #[arg(long = "site-link", value_name = "URL")]
    pub site_link: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the pygmentize executable used for code highlighting.
    #[arg(long = "render-pygmentize-path", value_name = "PATH")]
    pub pygmentize_path: Option<PathBuf>,

    /// Override the Graphviz `dot` executable used for diagrams.
    #[arg(long = "render-dot-path", value_name = "PATH")]
    pub dot_path: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverride {
    /// Override the rendered-response cache directory.
    #[arg(long = "cache-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub content: ContentOverrides,

    #[command(flatten)]
    pub render: RenderOverrides,

    #[command(flatten)]
    pub cache: CacheOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Force production mode on or off (enables the disk cache).
    #[arg(
        long = "site-live",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub site_live: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub content: ContentOverrides,

    /// File to write; stdout when omitted.
    #[arg(long, short, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Remove every cached response.
    Clear(CacheClearArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CacheClearArgs {
    #[command(flatten)]
    pub cache: CacheOverride,
}

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ConfigCommand {
    /// Print one resolved setting by dotted key, e.g. `posts.per_page`.
    Get(ConfigGetArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ConfigGetArgs {
    #[arg(value_name = "KEY")]
    pub key: String,
}
