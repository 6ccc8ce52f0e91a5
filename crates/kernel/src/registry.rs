use anyhow::{bail, Context};
use std::sync::Arc;

use crate::module::{InitCtx, Migration, Module};

/// Core module initialization order (the HTTP server is started separately)
const CORE_MODULE_ORDER: &[&str] = &[
    "db", // Store connection pool, released last
];

/// Module registry for managing module lifecycle with core/custom separation
pub struct ModuleRegistry {
    core_modules: Vec<Arc<dyn Module>>,
    custom_modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            core_modules: Vec::new(),
            custom_modules: Vec::new(),
        }
    }

    /// Register a core module. Only names listed in the core order are accepted.
    pub fn register_core(&mut self, module: Arc<dyn Module>) -> anyhow::Result<()> {
        if !CORE_MODULE_ORDER.contains(&module.name()) {
            bail!(
                "'{}' is not a core module; expected one of {:?}",
                module.name(),
                CORE_MODULE_ORDER
            );
        }
        self.ensure_unique(module.name())?;
        self.core_modules.push(module);
        Ok(())
    }

    /// Register a custom module with the registry
    pub fn register_custom(&mut self, module: Arc<dyn Module>) -> anyhow::Result<()> {
        self.ensure_unique(module.name())?;
        self.custom_modules.push(module);
        Ok(())
    }

    fn ensure_unique(&self, name: &str) -> anyhow::Result<()> {
        if self.get_module(name).is_some() {
            bail!("module '{}' is already registered", name);
        }
        Ok(())
    }

    /// Get all registered modules (core + custom)
    pub fn modules(&self) -> Vec<&Arc<dyn Module>> {
        let mut all_modules = Vec::new();
        all_modules.extend(self.core_modules.iter());
        all_modules.extend(self.custom_modules.iter());
        all_modules
    }

    /// Get a module by name (searches both core and custom modules)
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .find(|module| module.name() == name)
            .or_else(|| {
                self.custom_modules
                    .iter()
                    .find(|module| module.name() == name)
            })
    }

    pub fn core_module_count(&self) -> usize {
        self.core_modules.len()
    }

    pub fn custom_module_count(&self) -> usize {
        self.custom_modules.len()
    }

    /// Core modules in their fixed lifecycle order
    fn ordered_core_modules(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Module>> {
        CORE_MODULE_ORDER.iter().filter_map(move |&name| {
            self.core_modules
                .iter()
                .find(|module| module.name() == name)
        })
    }

    /// Initialize every module: core modules in order, then custom modules
    pub async fn init_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            "initializing core modules in order: {:?}",
            CORE_MODULE_ORDER
        );
        for module in self.ordered_core_modules() {
            tracing::info!(module = module.name(), "initializing core module");
            module
                .init(ctx)
                .await
                .with_context(|| format!("failed to initialize core module '{}'", module.name()))?;
        }

        tracing::info!("initializing {} custom modules", self.custom_modules.len());
        for module in &self.custom_modules {
            tracing::info!(module = module.name(), "initializing custom module");
            module.init(ctx).await.with_context(|| {
                format!("failed to initialize custom module '{}'", module.name())
            })?;
        }

        Ok(())
    }

    /// Start every module: core modules in order, then custom modules
    pub async fn start_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        for module in self.ordered_core_modules() {
            tracing::info!(module = module.name(), "starting core module");
            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start core module '{}'", module.name()))?;
        }

        for module in &self.custom_modules {
            tracing::info!(module = module.name(), "starting custom module");
            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start custom module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop custom modules in reverse registration order, then core modules
    /// in reverse core order.
    ///
    /// Every module is stopped even if an earlier one fails; the first
    /// failure is returned.
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        let mut first_error = None;

        tracing::info!("stopping {} custom modules", self.custom_modules.len());
        for module in self.custom_modules.iter().rev() {
            tracing::info!(module = module.name(), "stopping custom module");
            if let Err(e) = module.stop().await {
                tracing::error!(module = module.name(), error = ?e, "custom module failed to stop");
                first_error.get_or_insert_with(|| {
                    e.context(format!("failed to stop custom module '{}'", module.name()))
                });
            }
        }

        tracing::info!("stopping core modules in reverse order");
        for module in self.ordered_core_modules().rev() {
            tracing::info!(module = module.name(), "stopping core module");
            if let Err(e) = module.stop().await {
                tracing::error!(module = module.name(), error = ?e, "core module failed to stop");
                first_error.get_or_insert_with(|| {
                    e.context(format!("failed to stop core module '{}'", module.name()))
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Collect all migrations from all modules (core + custom)
    pub fn collect_migrations(&self) -> Vec<(String, Migration)> {
        let mut migrations = Vec::new();

        for module in self.modules() {
            for migration in module.migrations() {
                migrations.push((module.name().to_string(), migration));
            }
        }

        // Sort by module name and migration ID for deterministic ordering
        migrations.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(b.1.id)));

        migrations
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::sync::Mutex;

    struct TestModule {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        fail_stop: bool,
    }

    impl TestModule {
        fn record(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{event}:{}", self.name));
        }
    }

    #[async_trait::async_trait]
    impl Module for TestModule {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
            self.record("init");
            Ok(())
        }

        fn migrations(&self) -> Vec<Migration> {
            vec![
                Migration {
                    id: "002_index",
                    up: "CREATE INDEX t_idx ON t (id);",
                },
                Migration {
                    id: "001_init",
                    up: "CREATE TABLE t (id TEXT);",
                },
            ]
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.record("stop");
            if self.fail_stop {
                anyhow::bail!("{} refused to stop", self.name);
            }
            Ok(())
        }
    }

    fn module(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Module> {
        Arc::new(TestModule {
            name,
            journal: Arc::clone(journal),
            fail_stop: false,
        })
    }

    fn failing_module(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Module> {
        Arc::new(TestModule {
            name,
            journal: Arc::clone(journal),
            fail_stop: true,
        })
    }

    #[test]
    fn empty_registry_has_no_modules_or_migrations() {
        let registry = ModuleRegistry::new();
        assert!(registry.modules().is_empty());
        assert!(registry.collect_migrations().is_empty());
    }

    #[test]
    fn rejects_unknown_core_module_and_duplicates() {
        let journal = Arc::default();
        let mut registry = ModuleRegistry::new();

        assert!(registry.register_core(module("books", &journal)).is_err());
        registry.register_core(module("db", &journal)).unwrap();
        registry.register_custom(module("books", &journal)).unwrap();
        assert!(registry.register_custom(module("books", &journal)).is_err());

        assert_eq!(registry.core_module_count(), 1);
        assert_eq!(registry.custom_module_count(), 1);
    }

    #[test]
    fn migrations_are_sorted_per_module() {
        let journal = Arc::default();
        let mut registry = ModuleRegistry::new();
        registry.register_custom(module("books", &journal)).unwrap();

        let ids: Vec<_> = registry
            .collect_migrations()
            .into_iter()
            .map(|(module, migration)| format!("{module}/{}", migration.id))
            .collect();
        assert_eq!(ids, vec!["books/001_init", "books/002_index"]);
    }

    #[tokio::test]
    async fn lifecycle_stops_custom_before_core() {
        let journal: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut registry = ModuleRegistry::new();
        registry.register_core(module("db", &journal)).unwrap();
        registry.register_custom(module("books", &journal)).unwrap();
        registry.register_custom(module("authors", &journal)).unwrap();

        let settings = Settings::default();
        let ctx = InitCtx {
            settings: &settings,
        };

        registry.init_all(&ctx).await.unwrap();
        registry.start_all(&ctx).await.unwrap();
        registry.stop_all().await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "init:db",
                "init:books",
                "init:authors",
                "stop:authors",
                "stop:books",
                "stop:db",
            ]
        );
    }

    #[tokio::test]
    async fn failed_custom_stop_still_stops_core() {
        let journal: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut registry = ModuleRegistry::new();
        registry.register_core(module("db", &journal)).unwrap();
        registry.register_custom(failing_module("books", &journal)).unwrap();
        registry.register_custom(failing_module("authors", &journal)).unwrap();

        let err = registry.stop_all().await.unwrap_err();
        assert!(format!("{err:#}").contains("authors refused to stop"));
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["stop:authors", "stop:books", "stop:db"]
        );
    }
}
