pub mod books;

use std::sync::Arc;

use bookshelf_db::{Database, DatabaseModule};
use bookshelf_kernel::ModuleRegistry;

use books::repository::SqlBookRepository;

/// Register the core and project modules over an open database
pub fn register_all(registry: &mut ModuleRegistry, database: &Database) -> anyhow::Result<()> {
    registry.register_core(Arc::new(DatabaseModule::new(database.clone())))?;

    let repository = Arc::new(SqlBookRepository::new(database.pool().clone()));
    registry.register_custom(books::create_module(repository)?)?;

    Ok(())
}
