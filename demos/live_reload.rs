//! Example demonstrating file watching and live reload.
//!
//! This example shows how to:
//! - Register a configuration with an argument overlay and a file
//! - Reject changes with validators and react to them with appliers
//! - Receive every committed configuration on a subscription
//!
//! Run with: cargo run --example live_reload -- --config demos/config/live_reload.yaml
//!
//! While running, edit the file to see reloads. Set `RUST_LOG=livecfg=debug`
//! for the reload pipeline logs.

use livecfg::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    config: Option<PathBuf>,
    verbose: u8,
    server: ServerConfig,
    database: DatabaseConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    port: u16,
    host: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DatabaseConfig {
    url: String,
    max_connections: u32,
}

impl Configuration for AppConfig {
    fn config_file(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

const DEFAULT_PATH: &str = "demos/config/live_reload.yaml";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Live Reload Example ===\n");

    let default_path = Path::new(DEFAULT_PATH);
    if !default_path.exists() {
        if let Some(dir) = default_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(
            default_path,
            r#"server:
  port: 8080
  host: localhost

database:
  url: postgres://localhost/mydb
  max_connections: 10
"#,
        )?;
        println!("Created {}", DEFAULT_PATH);
    }

    let manager: Manager<&'static str, AppConfig> = Manager::new();

    // The listening port is fixed once the server is up
    manager.add_validator("app", |prior: Option<&AppConfig>, next: &AppConfig| {
        match prior {
            Some(prior) if prior.server.port != next.server.port => {
                vec![ValidationError::immutable("server.port")]
            }
            _ => Vec::new(),
        }
    });
    manager.add_validator("app", |_: Option<&AppConfig>, next: &AppConfig| {
        if next.database.max_connections == 0 {
            vec![ValidationError::invalid_field("database.max_connections", "must be positive")]
        } else {
            Vec::new()
        }
    });
    manager.add_applier(
        "app",
        |prior: Option<&AppConfig>, next: &mut AppConfig| -> std::result::Result<(), ApplyError> {
            if let Some(prior) = prior {
                if prior.database.max_connections != next.database.max_connections {
                    println!(
                        "[Apply] Resizing pool: {} -> {}",
                        prior.database.max_connections, next.database.max_connections
                    );
                }
            }
            Ok(())
        },
    );

    let args = ArgOverlay::new("live_reload")
        .arg(ArgSpec::value("config", "config").short('c').help("Configuration file"))
        .arg(ArgSpec::value("server.host", "host").help("Listen address"))
        .arg(ArgSpec::count("verbose", "verbose").short('v').help("More output"));

    let initial = AppConfig {
        config: Some(PathBuf::from(DEFAULT_PATH)),
        ..Default::default()
    };
    manager
        .register_with("app", initial, RegisterOptions::new().with_args(args))
        .await?;

    let Some(cfg) = manager.get("app") else {
        return Err(ConfigError::NotRegistered("app".to_string()).into());
    };
    println!("Current configuration:");
    println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
    println!(
        "  Database: {} (max connections: {})",
        cfg.database.url, cfg.database.max_connections
    );

    if let Some(path) = cfg.config_file() {
        println!("\n===> Try editing {} to see live reloads! <===", path.display());
    }
    println!("     - Change max_connections: 10 -> 20 (applied)");
    println!("     - Change port: 8080 -> 9090 (rejected)");
    println!("\nPress Ctrl+C to exit\n");

    let mut updates = manager.subscribe("app");
    let mut reloads = 0;
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(cfg) = update else { break };
                reloads += 1;
                println!("[Event] Configuration reloaded (reload #{})", reloads);
                println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
                println!(
                    "  Database: {} (max: {})\n",
                    cfg.database.url, cfg.database.max_connections
                );
            }
            _ = tokio::signal::ctrl_c() => {
                manager.shutdown();
            }
        }
    }

    println!("Stopped after {} reloads", reloads);
    Ok(())
}
