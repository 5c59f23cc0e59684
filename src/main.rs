//! # photowall
//!
//! Rotates the desktop wallpaper with photos from a self-hosted Immich
//! server, a Google Photos library or a local folder.
//!
//! ## Architecture
//! - `providers/` - Photo sources behind one `PhotoSource` contract
//! - `endpoint.rs` - LAN/WAN endpoint selection for Immich
//! - `credential.rs` - OAuth refresh for Google Photos
//! - `aggregate.rs` - Dedup and random selection
//! - `wallpaper/` - Per-monitor wallpaper with legacy fallback (Windows, COSMIC)
//! - `pipeline.rs` - Gallery, auto-apply, apply-selected, editor source
//! - `service.rs` / `dbus_client.rs` - D-Bus interface and client
//! - `timer.rs` / `daemon.rs` - Interval timer and the long-running process
//!
//! ## CLI Usage
//! - No arguments: run the daemon (timer + D-Bus service)
//! - `--refresh`, `-r`: change the wallpaper now
//! - `--gallery`, `-g [N]`: list N random photos
//! - `--set`, `-s <id> [position]`: apply a specific photo
//! - `--edit`, `-e <id>`: download a photo for editing and print its path
//! - `--albums`, `--people`: list ids for the configuration file
//! - `--reload`: make a running daemon re-read its configuration
//! - `--status`: show what the running daemon is doing
//! - `--help`, `-h` / `--version`, `-v`

mod aggregate;   // Dedup and random pick over candidates
mod config;      // User configuration (JSON)
mod credential;  // Google OAuth refresh-token grant
mod daemon;      // Long-running mode: timer + D-Bus service
mod dbus_client; // Proxy used by the CLI to reach a running daemon
mod discovery;   // Albums/people/tags listing
mod endpoint;    // Primary/fallback endpoint probe
mod error;       // PipelineError taxonomy
mod http;        // Per-operation HTTP clients
mod pipeline;    // End-to-end operations
mod providers;   // Local, Immich and Google Photos sources
mod service;     // D-Bus interface
mod timer;       // Interval timer
mod wallpaper;   // Desktop wallpaper backends

use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use config::Config;
use dbus_client::WallpaperClient;
use pipeline::{Outcome, Pipeline, Trigger};
use wallpaper::{default_cache_path, PlatformBackend, Position};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "photowall=info";

/// Default number of gallery entries.
const DEFAULT_GALLERY_COUNT: usize = 4;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatches on the first argument. The same binary is daemon and CLI.
fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("--daemon");

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = match command {
        "--daemon" => rt.block_on(daemon::run()),
        "--refresh" | "-r" => rt.block_on(refresh()),
        "--gallery" | "-g" => match parse_count(args.get(2)) {
            Ok(count) => rt.block_on(gallery(count)),
            Err(e) => Err(e),
        },
        "--set" | "-s" => match (args.get(2), parse_position(args.get(3))) {
            (Some(id), Ok(position)) => rt.block_on(set(id, position)),
            (None, _) => Err("--set needs a photo id".to_string()),
            (_, Err(e)) => Err(e),
        },
        "--edit" | "-e" => match args.get(2) {
            Some(id) => rt.block_on(edit(id)),
            None => Err("--edit needs a photo id".to_string()),
        },
        "--albums" => rt.block_on(list(Listing::Albums)),
        "--people" => rt.block_on(list(Listing::People)),
        "--reload" => rt.block_on(reload()),
        "--status" => rt.block_on(status()),
        "--help" | "-h" => {
            print_help(args.first().map(String::as_str).unwrap_or("photowall"));
            Ok(())
        }
        "--version" | "-v" => {
            println!("photowall {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => {
            eprintln!("Unknown argument: {other}");
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn print_help(program: &str) {
    println!("Photo wallpaper from Immich, Google Photos or a local folder\n");
    println!("Usage: {program} [OPTIONS]\n");
    println!("Options:");
    println!("  (none)                    Run the daemon (timer + D-Bus service)");
    println!("  --refresh, -r             Change the wallpaper now");
    println!("  --gallery, -g [N]         List N random photos (default {DEFAULT_GALLERY_COUNT})");
    println!("  --set, -s <id> [pos]      Apply a photo; pos is center, tile, stretch, fit, fill or span");
    println!("  --edit, -e <id>           Download a photo for editing and print its path");
    println!("  --albums                  List albums of the configured source");
    println!("  --people                  List Immich people and tags");
    println!("  --reload                  Make the running daemon re-read its configuration");
    println!("  --status                  Show what the running daemon is doing");
    println!("  --version, -v             Show version information");
    println!("  --help, -h                Show this help message");
    println!();
    if let Some(path) = Config::config_path() {
        println!("Configuration: {}", path.display());
    }
    println!("Set RUST_LOG=photowall=debug for detailed logs.");
}

fn parse_count(arg: Option<&String>) -> Result<usize, String> {
    match arg {
        None => Ok(DEFAULT_GALLERY_COUNT),
        Some(n) => n
            .parse::<usize>()
            .map_err(|_| format!("Invalid gallery size: {n}")),
    }
}

fn parse_position(arg: Option<&String>) -> Result<Option<Position>, String> {
    arg.map(|p| p.parse::<Position>()).transpose()
}

fn local_pipeline() -> Pipeline<PlatformBackend> {
    Pipeline::new(PlatformBackend::default(), default_cache_path())
}

/// Connects to the daemon if one is running.
async fn daemon_client() -> Option<WallpaperClient> {
    if !dbus_client::is_service_available().await {
        return None;
    }
    WallpaperClient::connect().await.ok()
}

async fn refresh() -> Result<(), String> {
    if let Some(client) = daemon_client().await {
        let status = client.refresh_wallpaper().await.map_err(|e| e.to_string())?;
        println!("{status}");
        return Ok(());
    }

    let config = Config::load();
    let outcome = local_pipeline()
        .auto_apply(&config, Trigger::Interactive)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", outcome.message());
    Ok(())
}

async fn gallery(count: usize) -> Result<(), String> {
    let config = Config::load();
    let items = local_pipeline()
        .fetch_gallery(&config, count)
        .await
        .map_err(|e| e.to_string())?;

    for item in items {
        match item.thumbnail {
            Some(bytes) => println!("{}\t{} bytes", item.id, bytes.len()),
            None => println!("{}", item.id),
        }
    }
    Ok(())
}

async fn set(id: &str, position: Option<Position>) -> Result<(), String> {
    if let Some(client) = daemon_client().await {
        let position = position.map(|p| p.as_str()).unwrap_or("");
        let status = client.apply_photo(id, position).await.map_err(|e| e.to_string())?;
        println!("{status}");
        return Ok(());
    }

    let config = Config::load();
    let position = position.unwrap_or(config.position);
    let outcome = local_pipeline()
        .apply_selected(&config, id, position)
        .await
        .map_err(|e| e.to_string())?;
    if let Outcome::Skipped(reason) = &outcome {
        return Err(reason.clone());
    }
    println!("{}", outcome.message());
    Ok(())
}

async fn edit(id: &str) -> Result<(), String> {
    let path = match daemon_client().await {
        Some(client) => client.prepare_editor_source(id).await.map_err(|e| e.to_string())?,
        None => local_pipeline()
            .prepare_editor_source(&Config::load(), id)
            .await
            .map_err(|e| e.to_string())?
            .to_string_lossy()
            .to_string(),
    };
    println!("{path}");
    Ok(())
}

enum Listing {
    Albums,
    People,
}

async fn list(listing: Listing) -> Result<(), String> {
    let config = Config::load();
    let items = match listing {
        Listing::Albums => discovery::list_albums(&config).await,
        Listing::People => discovery::list_people(&config).await,
    }
    .map_err(|e| e.to_string())?;

    if items.is_empty() {
        println!("Nothing found");
    }
    for item in items {
        println!("{}\t{}", item.id, item.name);
    }
    Ok(())
}

async fn reload() -> Result<(), String> {
    let client = daemon_client().await.ok_or("The daemon is not running")?;
    client.reload_config().await.map_err(|e| e.to_string())?;
    println!("Configuration reloaded");
    Ok(())
}

async fn status() -> Result<(), String> {
    let client = daemon_client().await.ok_or("The daemon is not running")?;
    let (busy, stage, last) = client.get_status().await.map_err(|e| e.to_string())?;
    println!("{}", describe_status(busy, &stage, &last));
    Ok(())
}

fn describe_status(busy: bool, stage: &str, last: &str) -> String {
    let current = if busy {
        format!("Changing wallpaper ({stage})")
    } else {
        "Idle".to_string()
    };
    if last.is_empty() {
        current
    } else {
        format!("{current}\nLast change: {last}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_status() {
        assert_eq!(describe_status(false, "idle", ""), "Idle");
        assert_eq!(
            describe_status(true, "downloading", "Wallpaper updated from Immich on 2 monitors"),
            "Changing wallpaper (downloading)\nLast change: Wallpaper updated from Immich on 2 monitors"
        );
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(None).unwrap(), DEFAULT_GALLERY_COUNT);
        assert_eq!(parse_count(Some(&"9".to_string())).unwrap(), 9);
        assert!(parse_count(Some(&"many".to_string())).is_err());
    }

    #[test]
    fn test_parse_position_argument() {
        assert_eq!(parse_position(None).unwrap(), None);
        assert_eq!(parse_position(Some(&"fit".to_string())).unwrap(), Some(Position::Fit));
        assert!(parse_position(Some(&"zoom".to_string())).is_err());
    }
}
