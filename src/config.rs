use crate::models::asset::AccessPolicy;
use crate::services::{
    edge::DEFAULT_RENDER_ROUTE,
    reconciler::DEFAULT_CONCURRENCY,
    upload_options::UnknownContentType,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{env, path::PathBuf};

/// Whether the server renders for local development or sits behind the edge.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Development,
    #[default]
    Production,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub mode: Mode,
    /// Bucket served as origin in production mode.
    pub bucket: Option<String>,
    /// Static files served directly in development mode.
    pub public_dir: PathBuf,
    pub render_route: String,
    pub assets_manifest: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            storage_dir: "./data/objects".into(),
            database_url: "sqlite://./data/meta/asset_publisher.db".into(),
            mode: Mode::Production,
            bucket: None,
            public_dir: PathBuf::from("./public"),
            render_route: DEFAULT_RENDER_ROUTE.into(),
            assets_manifest: PathBuf::from("./build/assets.json"),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Publish static assets to a lazily deleted bucket")]
pub struct Args {
    /// Directory where objects are stored (overrides ASSET_PUBLISHER_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ASSET_PUBLISHER_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the files matched by the patterns with the container's bucket
    Publish(PublishArgs),
    /// Serve the rendered shell and the published bucket over HTTP
    Serve(ServeArgs),
    /// Remove objects whose lifecycle rule has elapsed
    Expire,
    /// Run migrations and exit
    Migrate,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PublishArgs {
    /// Logical container name; the bucket defaults to `<container>-bucket`
    pub container: String,

    /// Glob patterns, relative to --cwd. Prefix with `!` to exclude.
    #[arg(required = true)]
    pub patterns: Vec<String>,

    /// Directory the patterns are matched against
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Match files and directories whose name starts with a dot
    #[arg(long)]
    pub dot: bool,

    /// Patterns to exclude (repeatable)
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Physical bucket name
    #[arg(long)]
    pub bucket: Option<String>,

    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Days a removed asset is kept before expiration
    #[arg(long, default_value_t = 15)]
    pub retention_days: i64,

    /// State file (defaults to `.asset-publisher/<container>.json`)
    #[arg(long)]
    pub state: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    #[arg(long, default_value = "public-read")]
    pub access_policy: AccessPolicy,

    /// Content type for unrecognized extensions: `html` or `octet-stream`
    #[arg(long, default_value = "html")]
    pub unknown_content_type: UnknownContentType,

    /// Report what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl PublishArgs {
    pub fn state_path(&self) -> PathBuf {
        self.state.clone().unwrap_or_else(|| {
            PathBuf::from(".asset-publisher").join(format!("{}.json", self.container))
        })
    }
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Host to bind to (overrides ASSET_PUBLISHER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_PUBLISHER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Overrides ASSET_PUBLISHER_MODE
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Bucket to serve in production mode (overrides ASSET_PUBLISHER_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Overrides ASSET_PUBLISHER_PUBLIC_DIR
    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    /// Overrides ASSET_PUBLISHER_RENDER_ROUTE
    #[arg(long)]
    pub render_route: Option<String>,

    /// Client bundle manifest (overrides ASSET_PUBLISHER_ASSETS_MANIFEST)
    #[arg(long)]
    pub assets_manifest: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the subcommand.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        let serve = match &args.command {
            Command::Serve(serve) => serve.clone(),
            _ => ServeArgs::default(),
        };
        let cfg = Self::resolve(args.storage_dir, args.database_url, serve, |name| {
            env::var(name)
        })?;
        Ok((cfg, args.command))
    }

    /// Merge CLI values over environment values over defaults.
    pub fn resolve(
        storage_dir: Option<String>,
        database_url: Option<String>,
        serve: ServeArgs,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| -> Result<Option<String>> {
            match lookup(name) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };

        // --- Environment fallback ---
        let env_port = match var("ASSET_PUBLISHER_PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ASSET_PUBLISHER_PORT value `{}`", value))?,
            None => defaults.port,
        };
        let env_mode = match var("ASSET_PUBLISHER_MODE")? {
            Some(value) => Mode::from_str(&value, true).map_err(|err| {
                anyhow::anyhow!("parsing ASSET_PUBLISHER_MODE value `{}`: {}", value, err)
            })?,
            None => defaults.mode,
        };

        // --- Merge ---
        Ok(Self {
            host: serve
                .host
                .or(var("ASSET_PUBLISHER_HOST")?)
                .unwrap_or(defaults.host),
            port: serve.port.unwrap_or(env_port),
            storage_dir: storage_dir
                .or(var("ASSET_PUBLISHER_STORAGE_DIR")?)
                .unwrap_or(defaults.storage_dir),
            database_url: database_url
                .or(var("ASSET_PUBLISHER_DATABASE_URL")?)
                .unwrap_or(defaults.database_url),
            mode: serve.mode.unwrap_or(env_mode),
            bucket: serve.bucket.or(var("ASSET_PUBLISHER_BUCKET")?),
            public_dir: serve
                .public_dir
                .or(var("ASSET_PUBLISHER_PUBLIC_DIR")?.map(PathBuf::from))
                .unwrap_or(defaults.public_dir),
            render_route: serve
                .render_route
                .or(var("ASSET_PUBLISHER_RENDER_ROUTE")?)
                .unwrap_or(defaults.render_route),
            assets_manifest: serve
                .assets_manifest
                .or(var("ASSET_PUBLISHER_ASSETS_MANIFEST")?.map(PathBuf::from))
                .unwrap_or(defaults.assets_manifest),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
