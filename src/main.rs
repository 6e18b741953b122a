use anyhow::{Context, Result};
use asset_publisher::{
    config::{AppConfig, Command, PublishArgs},
    routes::routes::{AppState, routes},
    services::{
        asset_resource::AssetProvider,
        bucket_resource::{BucketConfig, BucketContainer},
        edge::{AssetManifest, EdgeHandler, ShellRenderer},
        glob::GlobOptions,
        object_store::ObjectStoreClient,
        reconciler::{AssetReport, Outcome, ReconcileOptions, Reconciler},
        state::DeploymentState,
        storage_service::StorageService,
        upload_options::UploadOptions,
    },
};
use axum::Router;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + subcommand ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting asset-publisher with config: {:?}", cfg);

    let storage = open_storage(&cfg).await?;

    match command {
        Command::Migrate => {
            storage.migrate().await?;
            tracing::info!("Database migration complete.");
        }
        Command::Expire => {
            storage.migrate().await?;
            let expired = storage.expire_objects(Utc::now()).await?;
            tracing::info!("Expired {} objects", expired.len());
            for (bucket, key) in expired {
                println!("expired {}/{}", bucket, key);
            }
        }
        Command::Publish(args) => {
            storage.migrate().await?;
            publish(Arc::new(storage), args).await?;
        }
        Command::Serve(_) => {
            storage.migrate().await?;
            serve(storage, cfg).await?;
        }
    }

    Ok(())
}

/// Open the SQLite pool and make sure the storage directories exist.
async fn open_storage(cfg: &AppConfig) -> Result<StorageService> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if !db_url.contains(":memory:") {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLx does not create the file on its own
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            Ok(_) => tracing::debug!("File can be created/opened successfully."),
            Err(e) => tracing::warn!("Failed to open file manually: {}", e),
        }
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("connecting to {}", db_url))?;

    Ok(StorageService::new(Arc::new(db), cfg.storage_dir.clone()))
}

async fn publish(store: Arc<dyn ObjectStoreClient>, args: PublishArgs) -> Result<()> {
    let glob_options = GlobOptions {
        cwd: args.cwd.clone(),
        dot: args.dot,
        ignore: args.ignore.clone(),
    };
    let bucket_config = BucketConfig {
        name: args.bucket.clone(),
        region: args.region.clone(),
        retention_days: args.retention_days,
    };
    let container =
        BucketContainer::build(&args.container, &args.patterns, &glob_options, &bucket_config)?;

    let state_path = args.state_path();
    let mut state = DeploymentState::load(&state_path, &args.container).await?;

    let provider = AssetProvider::new(
        store.clone(),
        UploadOptions {
            access_policy: args.access_policy,
            unknown_content_type: args.unknown_content_type,
        },
    );
    let reconciler = Reconciler::new(
        store,
        provider,
        ReconcileOptions {
            concurrency: args.concurrency,
        },
    );
    let plan = reconciler.plan(&container, &state);

    if args.dry_run {
        let reports = reconciler.preview(&plan).await;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            print_reports(&reports);
        }
        return Ok(());
    }

    let report = reconciler.apply(&container, plan, &mut state).await?;
    state.save(&state_path).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_reports(&report.assets);
        if let Some(outputs) = &report.outputs {
            println!("bucket                    {}", outputs.bucket);
            println!("bucketDomainName          {}", outputs.bucket_domain_name);
            println!("bucketRegionalDomainName  {}", outputs.bucket_regional_domain_name);
        }
    }

    if let Some(err) = &report.bucket_error {
        anyhow::bail!("container {}: {}", report.container, err);
    }
    let failures = report.failures().len();
    if failures > 0 {
        anyhow::bail!("container {}: {} assets failed", report.container, failures);
    }
    Ok(())
}

fn print_reports(reports: &[AssetReport]) {
    for report in reports {
        let outcome = match &report.outcome {
            Outcome::Succeeded => "ok".to_string(),
            Outcome::Failed(reason) => format!("failed: {}", reason),
            Outcome::Skipped(reason) => format!("skipped: {}", reason),
        };
        println!("{:<10} {:<48} {}", report.action, report.key, outcome);
    }
}

async fn serve(storage: StorageService, cfg: AppConfig) -> Result<()> {
    let manifest = AssetManifest::load(&cfg.assets_manifest)
        .await
        .with_context(|| format!("reading {}", cfg.assets_manifest.display()))?;
    let edge = EdgeHandler::new(
        cfg.render_route.clone(),
        manifest,
        cfg.mode,
        Arc::new(ShellRenderer::default()),
    );

    let state = AppState::new(storage, edge, &cfg);
    let app: Router = routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Server listening on http://{} ({:?} mode)",
        listener.local_addr()?,
        cfg.mode
    );
    axum::serve(listener, app).await?;

    Ok(())
}
