//! gridkit, a universal messaging gateway.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

use {
    gridkit_attachments::AttachmentFetcher,
    gridkit_common::Environment,
    gridkit_config::Config,
    gridkit_discord::DiscordProvider,
    gridkit_dispatch::{DispatchOrchestrator, TracingEventSink},
    gridkit_gateway::{AppState, RateLimiter, serve},
    gridkit_platforms::{PlatformLifecycleService, PlatformRegistry},
    gridkit_queue::{JobHandler, JobOptions, MemoryQueue, QueueBackend, RedisQueue, WorkerPool,
        worker::WorkerConfig},
    gridkit_store::{
        ApiKeyStore, ProjectStore, SqliteStore,
        records::{NewApiKey, NewProject},
    },
    gridkit_telegram::TelegramProvider,
    gridkit_vault::{CredentialVault, KeyEnv, generate_api_key, hash_api_key, key_prefix,
        key_suffix},
    gridkit_whatsapp_evo::WhatsAppEvoProvider,
};

#[derive(Parser)]
#[command(name = "gridkit", about = "gridkit, a universal messaging gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Port to listen on (overrides PORT).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default when no subcommand is given).
    Serve,
    /// Tenant project management.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// API key management.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project.
    Create {
        slug: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "development")]
        environment: String,
        #[arg(long, default_value = "operator")]
        owner: String,
        /// Mark as the owner's default project.
        #[arg(long, default_value_t = false)]
        default: bool,
    },
    /// List projects.
    List,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Issue an API key for a project. The secret is printed once.
    Issue {
        project_slug: String,
        #[arg(long, default_value = "cli")]
        name: String,
        /// Comma-separated scopes, e.g. `messages:send,messages:read`.
        #[arg(long, value_delimiter = ',', required = true)]
        scopes: Vec<String>,
        /// Key environment: live, test, or restricted.
        #[arg(long)]
        env: Option<String>,
    },
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(config).await,
        Commands::Project { action } => run_project(config, action).await,
        Commands::Key { action } => run_key(config, action).await,
    }
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::connect(&config.database_url)
            .await
            .context("database connection failed")?,
    );

    let vault = Arc::new(match &config.encryption_key {
        Some(key) => CredentialVault::from_hex(key.expose_secret())
            .context("ENCRYPTION_KEY rejected by vault")?,
        // Only reachable in development; config validation is fatal
        // elsewhere.
        None => {
            warn!("no ENCRYPTION_KEY set: using an ephemeral vault key, credentials will not survive restart");
            CredentialVault::ephemeral()
        },
    });

    let registry = Arc::new(PlatformRegistry::new([
        TelegramProvider::shared(),
        DiscordProvider::shared(),
        WhatsAppEvoProvider::shared(),
    ]));
    registry
        .initialize_all()
        .await
        .context("provider initialization failed")?;

    let queue_options = JobOptions::default();
    let queue: Arc<dyn QueueBackend> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisQueue::connect(url, queue_options)
                .await
                .context("redis connection failed")?,
        ),
        None => {
            warn!("no REDIS_URL set: using the in-process queue, jobs will not survive restart");
            Arc::new(MemoryQueue::new(queue_options))
        },
    };

    let events = Arc::new(TracingEventSink);
    let orchestrator = DispatchOrchestrator::new(
        Arc::clone(&store) as Arc<dyn ProjectStore>,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&registry),
        Arc::clone(&vault),
        AttachmentFetcher::default(),
        Arc::clone(&events) as _,
    );
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&queue),
        Arc::new(orchestrator) as Arc<dyn JobHandler>,
        queue_options,
        WorkerConfig::default(),
    ));
    pool.start().await;

    let lifecycle = Arc::new(PlatformLifecycleService::new(
        Arc::clone(&store) as _,
        Arc::clone(&vault),
        Arc::clone(&registry),
        config.api_base_url.clone(),
    ));

    let state = AppState {
        projects: Arc::clone(&store) as _,
        api_keys: Arc::clone(&store) as _,
        platform_configs: Arc::clone(&store) as _,
        messages: Arc::clone(&store) as _,
        registry: Arc::clone(&registry),
        lifecycle,
        queue: Arc::clone(&queue),
        vault: Arc::clone(&vault),
        fetcher: Arc::new(AttachmentFetcher::default()),
        events,
        limiter: Arc::new(RateLimiter::default_policy()),
    };

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    info!(
        environment = %config.environment.as_str(),
        port = config.port,
        providers = ?registry.provider_names(),
        "gridkit starting"
    );
    serve(state, config.port, shutdown.clone())
        .await
        .context("http server failed")?;

    // Drain in-flight jobs within the grace window, then tear down
    // adapters and providers.
    info!("shutting down");
    pool.shutdown().await;
    registry.shutdown().await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    warn!(error = %err, "SIGTERM handler unavailable");
                    let _ = ctrl_c.await;
                    shutdown.cancel();
                    return;
                },
            };
            tokio::select! {
                _ = ctrl_c => {},
                _ = sigterm.recv() => {},
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}

async fn run_project(config: Config, action: ProjectAction) -> anyhow::Result<()> {
    let store = SqliteStore::connect(&config.database_url).await?;
    match action {
        ProjectAction::Create {
            slug,
            name,
            environment,
            owner,
            default,
        } => {
            if !gridkit_common::validate::is_valid_slug(&slug) {
                anyhow::bail!("slug must match ^[a-z0-9-]+$");
            }
            let project = store
                .create_project(NewProject {
                    name: name.unwrap_or_else(|| slug.clone()),
                    slug,
                    environment: Environment::parse_or_development(&environment),
                    owner_id: owner,
                    is_default: default,
                })
                .await?;
            println!("created project {} ({})", project.slug, project.id);
        },
        ProjectAction::List => {
            for project in store.list_projects().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    project.slug,
                    project.id,
                    project.environment.as_str(),
                    if project.is_default { "default" } else { "" }
                );
            }
        },
    }
    Ok(())
}

async fn run_key(config: Config, action: KeyAction) -> anyhow::Result<()> {
    let store = SqliteStore::connect(&config.database_url).await?;
    match action {
        KeyAction::Issue {
            project_slug,
            name,
            scopes,
            env,
        } => {
            let project = store
                .find_project_by_slug(&project_slug)
                .await?
                .with_context(|| format!("project {project_slug} not found"))?;

            let env = match env.as_deref() {
                Some(raw) => {
                    KeyEnv::parse(raw).with_context(|| format!("unknown key environment {raw}"))?
                },
                None => match project.environment {
                    Environment::Production => KeyEnv::Live,
                    _ => KeyEnv::Test,
                },
            };

            let secret = generate_api_key(env);
            let record = store
                .insert_api_key(NewApiKey {
                    project_id: project.id,
                    key_hash: hash_api_key(&secret),
                    key_prefix: key_prefix(&secret).to_string(),
                    key_suffix: key_suffix(&secret).to_string(),
                    name,
                    scopes,
                    expires_at: None,
                })
                .await?;

            println!("key id: {}", record.id);
            println!("scopes: {}", record.scopes.join(","));
            // Printed exactly once; only the hash is stored.
            println!("secret: {secret}");
        },
    }
    Ok(())
}
