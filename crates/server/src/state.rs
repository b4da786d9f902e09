//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup. The `AppState` holds the configuration, the core
//! services over both stores and the account service, making them accessible to
//! all request handlers.

use crate::config::{AppConfig, TASK_CLAIM_ANALYSIS, TASK_FACT_VERDICT};
use axiant::{
    providers::{
        ai::AiProvider,
        db::durable::{mongo::MongoConnector, DurablePool},
        facts::build_fact_providers,
        factory::create_providers,
    },
    AiFactFallback, Analyzer, AxiantCore, AxiantCoreBuilder, EmbeddedStore,
};
use core_access::AccountService;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

/// A fully resolved task configuration with non-optional fields.
#[derive(Clone, Debug)]
pub struct ResolvedTask {
    pub provider: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// The shared application state, accessible from all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    /// Cache waterfall, provider chain, chats, analysis and reconciler.
    pub core: AxiantCore,
    pub accounts: AccountService,
}

impl AppState {
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}

/// Builds the Durable Store pool described by the configuration.
///
/// Without a URI the pool is disabled and every durable operation reports a
/// connectivity error, which the callers treat as "tier unavailable".
pub fn build_durable_pool(config: &AppConfig) -> DurablePool {
    match config.durable_store() {
        Some(durable) => {
            let uri = durable.uri.clone().unwrap_or_default();
            let connector = MongoConnector::new(uri, durable.database.clone(), durable.timeout());
            DurablePool::new(Arc::new(connector), durable.timeout())
        }
        None => {
            warn!(component = "durable", "No durable.uri configured; running in embedded-only mode.");
            DurablePool::disabled()
        }
    }
}

/// Builds the shared application state from the configuration.
///
/// Opens the Embedded Store at `embedded_db_path` and the Durable Store pool
/// from the `durable` section. An unreachable Durable Store is not fatal.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let durable = build_durable_pool(&config);
    assemble_state(config, durable).await
}

/// Builds the application state around an already constructed Durable Store pool.
pub async fn assemble_state(config: AppConfig, durable: DurablePool) -> anyhow::Result<AppState> {
    let timeout = config.request_timeout();

    // Create a map of AI provider instances from the configuration.
    let ai_providers = create_providers(&config.providers, timeout)?;
    let tasks = resolve_tasks(&config)?;

    let embedded = EmbeddedStore::open(&config.embedded_db_path).await?;
    info!(db_path = %config.embedded_db_path, "Initialized embedded store.");

    if durable.is_configured() {
        match durable.open().await {
            Ok(()) => info!("Connected to durable store."),
            Err(e) => {
                warn!(component = "durable", error = %e, "Durable store unreachable at startup; continuing in degraded mode.")
            }
        }
    }

    let mut builder = AxiantCoreBuilder::new()
        .embedded(embedded.clone())
        .durable(durable.clone())
        .fact_providers(build_fact_providers(&config.fact_sources, timeout)?);

    if let Some((provider, task)) = task_provider(&ai_providers, &tasks, TASK_FACT_VERDICT) {
        builder = builder.fact_fallback(AiFactFallback::new(
            provider,
            task.system_prompt.clone(),
            task.user_prompt.clone(),
        ));
    }
    if let Some((provider, task)) = task_provider(&ai_providers, &tasks, TASK_CLAIM_ANALYSIS) {
        builder = builder.analyzer(Analyzer::new(
            provider,
            task.system_prompt.clone(),
            task.user_prompt.clone(),
        ));
    }

    let core = builder.build()?;
    let accounts = AccountService::new(embedded, durable);

    Ok(AppState {
        config: Arc::new(config),
        core,
        accounts,
    })
}

// Validate and resolve all tasks from the configuration. The defaults layer
// fills every field of the built-in tasks, so a gap means a malformed file.
fn resolve_tasks(config: &AppConfig) -> anyhow::Result<HashMap<String, ResolvedTask>> {
    let mut resolved_tasks = HashMap::new();
    for (name, task_config) in &config.tasks {
        let provider = task_config.provider.clone().ok_or_else(|| {
            anyhow::anyhow!("Resolved task '{name}' is missing required 'provider' field")
        })?;
        let system_prompt = task_config.system_prompt.clone().ok_or_else(|| {
            anyhow::anyhow!("Resolved task '{name}' is missing required 'system_prompt' field")
        })?;
        let user_prompt = task_config.user_prompt.clone().ok_or_else(|| {
            anyhow::anyhow!("Resolved task '{name}' is missing required 'user_prompt' field")
        })?;

        resolved_tasks.insert(
            name.clone(),
            ResolvedTask {
                provider,
                system_prompt,
                user_prompt,
            },
        );
    }
    Ok(resolved_tasks)
}

/// The provider instance a task runs on, or `None` (with a warning) when the task
/// names a provider that is not configured.
fn task_provider<'a>(
    providers: &HashMap<String, Box<dyn AiProvider>>,
    tasks: &'a HashMap<String, ResolvedTask>,
    task_name: &str,
) -> Option<(Box<dyn AiProvider>, &'a ResolvedTask)> {
    let task = tasks.get(task_name)?;
    match providers.get(&task.provider) {
        Some(provider) => Some((provider.clone(), task)),
        None => {
            warn!(task = %task_name, provider = %task.provider, "Task provider is not configured; task disabled.");
            None
        }
    }
}
