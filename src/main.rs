//! davcache - WebDAV file cache
//!
//! Command line front end for the local file cache: fetch files and
//! directories into the cache, resolve effective locations and inspect or
//! clear the cache.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use davcache::{CacheConfig, EffectiveLocation, FileCacheSession};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Fetch one file into the cache
    Fetch { path: String, refresh: bool },
    /// Fetch a directory tree into the cache
    FetchDir {
        path: String,
        recursive: bool,
        refresh: bool,
    },
    /// Print the effective location of a file
    Url { path: String, cache_async: bool },
    /// Upload a local file into a fresh upload directory
    Upload { file: PathBuf, remote_root: String },
    /// Show cache usage
    Status,
    /// Remove every cached file
    Clear,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"davcache - Local disk cache for WebDAV files

USAGE:
    davcache fetch <path> [--refresh]
    davcache fetch-dir <path/> [--shallow] [--refresh]
    davcache url <path> [--async]
    davcache upload <local_file> <remote_root>
    davcache status
    davcache clear
    davcache help

COMMANDS:
    fetch       Fetch a file into the cache and print its local path
    fetch-dir   Fetch every file below a directory (path must end with '/')
    url         Print the local path if cached, otherwise the remote URL
    upload      Upload a file into a new unique directory below <remote_root>
    status      Show cache location, capacity and usage
    clear       Remove every cached file
    help        Show this help message

EXAMPLES:
    davcache fetch /WebDAV/groups/flylight/sample.tif
    davcache fetch-dir /WebDAV/groups/flylight/tiles/ --shallow
    davcache url /WebDAV/groups/flylight/sample.tif --async

ENVIRONMENT:
    DAVCACHE_CONFIG        Config file (default: <config dir>/davcache/config.json)
    DAVCACHE_WEBDAV_URL    WebDAV base URL
    DAVCACHE_USERNAME      WebDAV user name
    DAVCACHE_PASSWORD      WebDAV password
    DAVCACHE_CACHE_DIR     Directory holding the cache root
    DAVCACHE_CAPACITY_GB   Cache capacity in gigabytes (50-1000)
    DAVCACHE_DISABLED      Disable the cache (true/false)
    RUST_LOG               Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    let flag = |name: &str| args[2..].iter().any(|a| a == name);
    let operand = |usage: &str| -> Result<String> {
        args.get(2)
            .filter(|a| !a.starts_with("--"))
            .cloned()
            .ok_or_else(|| anyhow!("Usage: {}", usage))
    };

    match args[1].as_str() {
        "fetch" => Ok(Command::Fetch {
            path: operand("davcache fetch <path> [--refresh]")?,
            refresh: flag("--refresh"),
        }),
        "fetch-dir" => Ok(Command::FetchDir {
            path: operand("davcache fetch-dir <path/> [--shallow] [--refresh]")?,
            recursive: !flag("--shallow"),
            refresh: flag("--refresh"),
        }),
        "url" => Ok(Command::Url {
            path: operand("davcache url <path> [--async]")?,
            cache_async: flag("--async"),
        }),
        "upload" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: davcache upload <local_file> <remote_root>"));
            }
            Ok(Command::Upload {
                file: PathBuf::from(&args[2]),
                remote_root: args[3].clone(),
            })
        }
        "status" => Ok(Command::Status),
        "clear" => Ok(Command::Clear),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn load_config() -> Result<CacheConfig> {
    let path = env::var("DAVCACHE_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(CacheConfig::default_path);

    let mut config = match path {
        Some(path) => CacheConfig::load(&path)?,
        None => CacheConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = load_config()?;
    let session = FileCacheSession::new(config).context("Failed to create WebDAV client")?;

    match command {
        Command::Fetch { path, refresh } => {
            info!(path = %path, refresh, "Fetching file");
            match session.cached_file(&path, refresh).await {
                Some(local) => println!("{}", local.display()),
                None => return Err(anyhow!("{} could not be cached", path)),
            }
        }
        Command::FetchDir {
            path,
            recursive,
            refresh,
        } => {
            info!(path = %path, recursive, refresh, "Fetching directory");
            let local = session
                .cached_directory(&path, recursive, refresh)
                .await
                .with_context(|| format!("Failed to cache directory {}", path))?;
            println!("{}", local.display());
        }
        Command::Url { path, cache_async } => {
            match session.effective_location(&path, cache_async)? {
                EffectiveLocation::Local(local) => println!("{}", local.display()),
                EffectiveLocation::Remote(url) => {
                    println!("{}", url);
                    if cache_async {
                        // joins the background fetch so it completes before the runtime exits
                        session.cached_file(&path, false).await;
                    }
                }
            }
        }
        Command::Upload { file, remote_root } => {
            let client = session
                .client()
                .ok_or_else(|| anyhow!("Uploads need a WebDAV client"))?;
            let directory = client.unique_upload_directory_path(&remote_root);
            let directory_url = session.resolve_url(&directory)?;
            client.create_directory(&directory_url).await?;

            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("Invalid file name: {:?}", file))?;
            let target = directory_url
                .join(&urlencoding::encode(name))
                .context("Failed to build upload URL")?;
            if let Err(e) = client.upload_file(&target, &file).await {
                error!(file = %file.display(), error = %e, "Upload failed");
                return Err(e.into());
            }
            println!("{}", target);
        }
        Command::Status => {
            let config = session.config();
            println!("WebDAV:    {}", config.webdav_base_url);
            if let Some(client) = session.client() {
                let root = session.resolve_url("/")?;
                println!("Readable:  {}", client.can_read_directory(&root).await);
            }
            match session.cache() {
                None => println!("Cache:     disabled"),
                Some(cache) => {
                    cache.wait_until_loaded().await?;
                    println!("Cache:     {}", cache.root_directory().display());
                    println!("Capacity:  {} GB", session.capacity_gigabytes());
                    println!("Used:      {:.3} GB", session.usage_gigabytes());
                    println!("Files:     {}", cache.number_of_files());
                    if let Some(report) = cache.last_load_report() {
                        println!(
                            "Last scan: {} entries, removed {} files and {} directories in {:?}",
                            report.registered,
                            report.removed_files,
                            report.removed_directories,
                            report.duration
                        );
                    }
                    cache.log_metrics();
                }
            }
        }
        Command::Clear => {
            session.clear().await?;
            println!("Cache cleared.");
        }
        Command::Help => print_help(),
    }

    Ok(())
}
