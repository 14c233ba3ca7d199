use std::{path::PathBuf, process, sync::Arc, time::Duration};

use scribe::{
    application::{
        dispatch::Dispatcher,
        error::AppError,
        render::{ProcessRunner, RenderPipeline},
    },
    cache::DiskCache,
    config,
    infra::{error::InfraError, http, telemetry},
};
use serde_json::Value;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Feed(args) => run_feed(settings, args.output).await,
        config::Command::Cache(args) => match args.command {
            config::CacheCommand::Clear(_) => run_cache_clear(settings).await,
        },
        config::Command::Config(args) => match args.command {
            config::ConfigCommand::Get(get) => run_config_get(&settings, &get.key),
        },
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let runner = Arc::new(ProcessRunner::new(settings.render.command_timeout));
    let pipeline = RenderPipeline::standard(&settings.render, runner);
    let filters = pipeline.filter_names().join(",");
    let dispatcher = Arc::new(Dispatcher::new(&settings, pipeline));
    let cache_enabled = dispatcher.cache().is_enabled();
    let router = http::build_router(dispatcher);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "scribe::serve",
        addr = %settings.server.addr,
        live = settings.site.live,
        posts_dir = %settings.posts.dir.display(),
        cache_enabled,
        cache_dir = %settings.cache.dir.display(),
        filters = %filters,
        "listening"
    );

    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(());
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        Ok(()) = signal_rx => {
            info!(
                target = "scribe::serve",
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "shutdown signal received; draining connections"
            );
            drain(&mut server, settings.server.graceful_shutdown).await?;
        }
    }

    info!(target = "scribe::serve", "server stopped");
    Ok(())
}

async fn drain<F>(server: &mut F, grace: Duration) -> Result<(), AppError>
where
    F: Future<Output = std::io::Result<()>> + Unpin,
{
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "scribe::serve",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "scribe::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "scribe::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run_feed(settings: config::Settings, output: Option<PathBuf>) -> Result<(), AppError> {
    let dispatcher = Dispatcher::new(&settings, RenderPipeline::default());
    let xml = dispatcher.feed().await?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, xml.as_bytes())
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            info!(
                target = "scribe::feed",
                path = %path.display(),
                bytes = xml.len(),
                "feed written"
            );
        }
        None => print!("{xml}"),
    }
    Ok(())
}

async fn run_cache_clear(settings: config::Settings) -> Result<(), AppError> {
    let cache = DiskCache::new(settings.cache.dir.clone(), true);
    let removed = cache.clear().await?;
    info!(
        target = "scribe::cache",
        dir = %cache.dir().display(),
        removed,
        "cache cleared"
    );
    Ok(())
}

fn run_config_get(settings: &config::Settings, key: &str) -> Result<(), AppError> {
    let value = settings.lookup(key).ok_or_else(|| {
        AppError::from(InfraError::configuration(format!(
            "unknown configuration key `{key}`"
        )))
    })?;

    match value {
        Value::String(text) => println!("{text}"),
        other => println!("{other}"),
    }
    Ok(())
}
