//! Process bootstrap: open the store, register modules, run.

use anyhow::Context;
use axum::Router;
use bookshelf_db::Database;
use bookshelf_kernel::settings::Settings;
use bookshelf_kernel::{InitCtx, ModuleRegistry};

use crate::modules;

/// A fully wired application that has not started serving yet.
pub struct App {
    pub settings: Settings,
    pub database: Database,
    pub registry: ModuleRegistry,
}

/// Connect to the configured store and register every module.
pub async fn build(settings: Settings) -> anyhow::Result<App> {
    let database = Database::connect(&settings.database)
        .await
        .context("failed to open the book store")?;
    App::with_database(settings, database)
}

impl App {
    /// Wire the modules over an already opened database.
    pub fn with_database(settings: Settings, database: Database) -> anyhow::Result<Self> {
        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &database)?;

        tracing::info!(
            core = registry.core_module_count(),
            custom = registry.custom_module_count(),
            "modules registered"
        );

        Ok(Self {
            settings,
            database,
            registry,
        })
    }

    /// Apply pending migrations from every module.
    pub async fn migrate(&self) -> anyhow::Result<usize> {
        let migrations = self.registry.collect_migrations();
        let applied = self
            .database
            .migrate(&migrations)
            .await
            .context("failed to apply migrations")?;
        tracing::info!(applied, total = migrations.len(), "migrations complete");
        Ok(applied)
    }

    /// The full HTTP router, middleware included.
    pub fn router(&self) -> Router {
        bookshelf_http::build_router(&self.registry, &self.settings)
    }
}

/// Apply migrations and release the store.
pub async fn migrate(settings: Settings) -> anyhow::Result<usize> {
    let app = build(settings).await?;
    let applied = app.migrate().await;
    app.database.close().await;
    applied
}

/// Run the service until a shutdown signal arrives.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let app = build(settings).await?;
    app.migrate().await?;

    let ctx = InitCtx {
        settings: &app.settings,
    };
    app.registry.init_all(&ctx).await?;
    app.registry.start_all(&ctx).await?;

    let served = bookshelf_http::start_server(
        &app.registry,
        &app.settings,
        bookshelf_http::shutdown_signal(),
    )
    .await;

    // Modules are stopped even when the server failed; the pool is released last.
    let stopped = app.registry.stop_all().await;
    served?;
    stopped?;

    tracing::info!("bookshelf shut down cleanly");
    Ok(())
}
