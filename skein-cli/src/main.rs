use anyhow::{Context, Result};
use clap::Parser;
use skein_config::{ConfigLoader, LogLevel, SkeinConfig};
use skein_ipc::{ReconnectPolicy, ReplySocket, RequestSocket};
use skein_runtime::{TaskRegistry, WorkerPool};
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or environment variables
fn load_config(config_path: Option<&PathBuf>) -> Result<SkeinConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Initialize logging from configuration with fallback to simple tracing
fn init_logging(config: &SkeinConfig, log_level: Option<&String>) -> Result<()> {
    let mut logging_config = config.logging.clone();
    if let Some(level_str) = log_level {
        match level_str.parse::<LogLevel>() {
            Ok(level) => logging_config.level = level,
            Err(e) => eprintln!("{}, keeping '{}'", e, logging_config.level),
        }
    }

    if let Err(e) = skein_logging::init_logging_from_config(&logging_config) {
        eprintln!(
            "Failed to initialize logging: {}, falling back to simple tracing",
            e
        );
        skein_logging::init_simple_tracing(logging_config.level.as_str())?;
    }
    Ok(())
}

/// Reply to every request with `response: <request>`, computed on the pool,
/// until `shutdown` completes. Returns the number of requests served.
async fn serve_requests<F>(socket: &ReplySocket, pool: &WorkerPool, shutdown: F) -> Result<u64>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut served = 0u64;

    loop {
        let request = tokio::select! {
            request = socket.recv() => request.context("Reply socket stopped")?,
            _ = &mut shutdown => {
                info!("Shutdown requested");
                return Ok(served);
            }
        };

        let text = String::from_utf8_lossy(&request).into_owned();
        debug!("Received request: {}", text);
        let future = pool
            .apply(move || Ok(format!("response: {}", text)))
            .await
            .context("Worker pool is not running")?;

        let reply = match future.get().await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Failed to compute reply: {}", e);
                format!("error: {}", e)
            }
        };
        socket.send(reply)?;
        served += 1;
    }
}

/// Start the echo reply server
async fn serve_command(config: &SkeinConfig, port: Option<u16>) -> Result<()> {
    let registry = TaskRegistry::new();
    let pool = WorkerPool::with_capacity(
        config.runtime.pool_workers,
        &registry,
        config.runtime.mailbox_capacity,
    )?;
    pool.start(true).await?;

    let address = format!(
        "{}:{}",
        config.socket.bind_address,
        port.unwrap_or(config.socket.port)
    );
    let socket = ReplySocket::bind(address.as_str(), &config.socket.authkey)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    println!("Serving on {}", socket.local_addr());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };
    let result = serve_requests(&socket, &pool, shutdown).await;

    println!("{}", registry.table());
    pool.stop().await?;
    pool.join().await?;
    pool.finalize()?;

    let served = result?;
    info!("Served {} requests", served);
    Ok(())
}

/// Send one request and print the reply
async fn request_command(
    config: &SkeinConfig,
    message: &str,
    port: Option<u16>,
    timeout: Duration,
) -> Result<()> {
    let address = format!(
        "{}:{}",
        config.socket.bind_address,
        port.unwrap_or(config.socket.port)
    );
    let socket = RequestSocket::connect_with(
        address.clone(),
        &config.socket.authkey,
        ReconnectPolicy::fixed(config.socket.reconnect_delay),
    );

    socket.send(message.to_string())?;
    let reply = tokio::time::timeout(timeout, socket.recv())
        .await
        .with_context(|| format!("No reply from {} within {:?}", address, timeout))??;

    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_config) => {
            println!("Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed: {}", e);
            error!("Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: Option<&PathBuf>, force: bool) -> Result<()> {
    let sample = SkeinConfig::generate_sample();

    let Some(output) = output else {
        print!("{}", sample);
        return Ok(());
    };

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(output, sample).context("Failed to write configuration file")?;

    println!("Configuration written to {:?}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;
    debug!("Skein CLI starting");

    match &cli.command {
        Commands::Serve { port } => serve_command(&config, *port).await,
        Commands::Request {
            message,
            port,
            timeout,
        } => request_command(&config, message, *port, Duration::from_secs(*timeout)).await,
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => {
                handle_config_generate(output.as_ref(), *force)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serve_requests_echoes_until_shutdown() {
        let registry = TaskRegistry::new();
        let pool = WorkerPool::new(2, &registry).unwrap();
        pool.start(true).await.unwrap();

        let socket = ReplySocket::bind("127.0.0.1:0", "test").await.unwrap();
        let client = RequestSocket::connect_with(
            socket.local_addr(),
            "test",
            ReconnectPolicy::fixed(Duration::from_millis(20)),
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = async move {
            let _ = stop_rx.await;
        };

        let exchange = async {
            for word in ["alpha", "beta"] {
                client.send(word).unwrap();
                let reply = client.recv().await.unwrap();
                assert_eq!(reply, format!("response: {}", word).as_str());
            }
            stop_tx.send(()).unwrap();
        };

        let (served, ()) = tokio::join!(serve_requests(&socket, &pool, shutdown), exchange);
        assert_eq!(served.unwrap(), 2);

        pool.stop().await.unwrap();
        pool.join().await.unwrap();
        pool.finalize().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generate_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("skein.yaml");

        handle_config_generate(Some(&path), false).unwrap();
        assert!(handle_config_generate(Some(&path), false).is_err());
        handle_config_generate(Some(&path), true).unwrap();

        handle_config_validate(&path).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "runtime:\n  pool_workers: 0\n").unwrap();

        assert!(handle_config_validate(&path).is_err());
        assert!(handle_config_validate(&dir.path().join("missing.yaml")).is_err());
    }
}
