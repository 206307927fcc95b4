use crate::{dav::path::normalize_mount_prefix, services::dav_service::DavSettings};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub mount_prefix: String,
    pub max_listing_entries: usize,
    pub move_delete_retries: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "WebDAV gateway over a flat object store")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_DAV_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_DAV_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides OBJECT_DAV_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_DAV_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket holding every WebDAV resource (overrides OBJECT_DAV_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// URL path the WebDAV tree is served under (overrides OBJECT_DAV_MOUNT_PREFIX)
    #[arg(long)]
    pub mount_prefix: Option<String>,

    /// Upper bound on entries a single listing may materialize
    /// (overrides OBJECT_DAV_MAX_LISTING_ENTRIES)
    #[arg(long)]
    pub max_listing_entries: Option<usize>,

    /// Extra attempts at deleting a MOVE source (overrides OBJECT_DAV_MOVE_DELETE_RETRIES)
    #[arg(long)]
    pub move_delete_retries: Option<u32>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("OBJECT_DAV_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("OBJECT_DAV_PORT", 3000)?;
        let env_storage =
            env::var("OBJECT_DAV_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("OBJECT_DAV_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_dav.db".into());
        let env_bucket = env::var("OBJECT_DAV_BUCKET").unwrap_or_else(|_| "webdav".into());
        let env_mount = env::var("OBJECT_DAV_MOUNT_PREFIX").unwrap_or_else(|_| "/".into());
        let env_max_entries = env_parse("OBJECT_DAV_MAX_LISTING_ENTRIES", 10_000)?;
        let env_retries = env_parse("OBJECT_DAV_MOVE_DELETE_RETRIES", 2)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or(env_bucket),
            mount_prefix: normalize_mount_prefix(&args.mount_prefix.unwrap_or(env_mount)),
            max_listing_entries: args.max_listing_entries.unwrap_or(env_max_entries),
            move_delete_retries: args.move_delete_retries.unwrap_or(env_retries),
        };

        if cfg.max_listing_entries == 0 {
            anyhow::bail!("max listing entries must be at least 1");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn dav_settings(&self) -> DavSettings {
        DavSettings {
            mount_prefix: self.mount_prefix.clone(),
            max_listing_entries: self.max_listing_entries,
            move_delete_retries: self.move_delete_retries,
        }
    }
}

/// Read and parse `name`, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
