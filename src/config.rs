use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt};

/// Default ceiling for one upload request (a chunk plus its form fields).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 600 * 1024 * 1024;

/// Which gateway backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Webdav,
    Local,
}

impl BackendKind {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "webdav" => Ok(Self::Webdav),
            "local" => Ok(Self::Local),
            other => bail!("unknown STORAGE_BACKEND `{}` (expected webdav or local)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub webdav_url: Option<String>,
    pub webdav_user: Option<String>,
    pub webdav_password: Option<String>,
    pub storage_dir: String,
    pub max_chunk_bytes: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("webdav_url", &self.webdav_url)
            .field("webdav_user", &self.webdav_user)
            .field(
                "webdav_password",
                &self.webdav_password.as_ref().map(|_| "<redacted>"),
            )
            .field("storage_dir", &self.storage_dir)
            .field("max_chunk_bytes", &self.max_chunk_bytes)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Chunked upload/download dashboard over WebDAV")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// WebDAV base URL (overrides WEBDAV_URL)
    #[arg(long)]
    pub webdav_url: Option<String>,

    /// WebDAV username (overrides WEBDAV_USER)
    #[arg(long)]
    pub webdav_user: Option<String>,

    /// Root directory for the local backend (overrides STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Largest accepted upload request in bytes (overrides MAX_CHUNK_BYTES)
    #[arg(long)]
    pub max_chunk_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key))
    }

    /// Merge parsed CLI args over values looked up by `var`.
    ///
    /// The password is only ever read from the environment.
    pub fn resolve<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let lookup = |key: &str| -> Result<Option<String>> {
            match var(key) {
                Ok(value) if value.is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        // --- Environment fallback ---
        let env_host = lookup("HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match lookup("PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 8080,
        };
        let env_backend = match lookup("STORAGE_BACKEND")? {
            Some(value) => BackendKind::parse(&value)?,
            None => BackendKind::Webdav,
        };
        let env_max = match lookup("MAX_CHUNK_BYTES")? {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing MAX_CHUNK_BYTES value `{}`", value))?,
            None => DEFAULT_MAX_CHUNK_BYTES,
        };
        let env_storage = lookup("STORAGE_DIR")?.unwrap_or_else(|| "./data".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            webdav_url: args.webdav_url.or(lookup("WEBDAV_URL")?),
            webdav_user: args.webdav_user.or(lookup("WEBDAV_USER")?),
            webdav_password: lookup("WEBDAV_PASSWORD")?,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            max_chunk_bytes: args.max_chunk_bytes.unwrap_or(env_max),
        };

        if cfg.backend == BackendKind::Webdav && cfg.webdav_url.is_none() {
            bail!("WEBDAV_URL (or --webdav-url) is required for the webdav backend");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
