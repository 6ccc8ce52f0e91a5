pub mod models;
pub mod repository;
pub mod routes;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bookshelf_kernel::{InitCtx, Migration, Module};

use repository::BookRepository;
use routes::BooksState;
use schema::BookValidator;

/// Book catalog keyed by ISBN
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    /// Compiles the payload schemas; fails if either is malformed.
    pub fn new(repository: Arc<dyn BookRepository>) -> anyhow::Result<Self> {
        Ok(Self {
            state: BooksState {
                repository,
                validator: Arc::new(BookValidator::new()?),
            },
        })
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(routes::router(self.state.clone()))
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_create_books",
            up: r#"
                CREATE TABLE books (
                    isbn       TEXT PRIMARY KEY,
                    amazon_url TEXT NOT NULL,
                    author     TEXT NOT NULL,
                    language   TEXT NOT NULL,
                    pages      INTEGER NOT NULL CHECK (pages >= 0),
                    publisher  TEXT NOT NULL,
                    title      TEXT NOT NULL,
                    year       INTEGER NOT NULL
                );
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn openapi_fragment() -> serde_json::Value {
    let error_response = |description: &str| {
        serde_json::json!({
            "description": description,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                }
            }
        })
    };
    let book_response = |description: &str| {
        serde_json::json!({
            "description": description,
            "content": {
                "application/json": {
                    "schema": {
                        "type": "object",
                        "properties": { "book": { "$ref": "#/components/schemas/Book" } },
                        "required": ["book"]
                    }
                }
            }
        })
    };
    let book_body = serde_json::json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Book" }
            }
        }
    });
    let isbn_param = serde_json::json!([{
        "name": "isbn",
        "in": "path",
        "required": true,
        "schema": { "type": "string" }
    }]);

    serde_json::json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "Every book",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "books": {
                                                "type": "array",
                                                "items": { "$ref": "#/components/schemas/Book" }
                                            }
                                        },
                                        "required": ["books"]
                                    }
                                }
                            }
                        },
                        "500": error_response("Internal server error")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": book_body.clone(),
                    "responses": {
                        "201": book_response("Created book"),
                        "400": error_response("Validation error"),
                        "409": error_response("A book with this isbn already exists")
                    }
                }
            },
            "/{isbn}": {
                "parameters": isbn_param,
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "responses": {
                        "200": book_response("The book"),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Replace a book",
                    "tags": ["Books"],
                    "requestBody": book_body,
                    "responses": {
                        "200": book_response("Updated book"),
                        "400": error_response("Validation error"),
                        "404": error_response("Book not found")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "Book deleted",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "message": { "type": "string" } },
                                        "required": ["message"]
                                    }
                                }
                            }
                        },
                        "404": error_response("Book not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "isbn": { "type": "string", "description": "Unique identifier for the book" },
                        "amazon_url": { "type": "string" },
                        "author": { "type": "string" },
                        "language": { "type": "string" },
                        "pages": { "type": "integer", "minimum": 0 },
                        "publisher": { "type": "string" },
                        "title": { "type": "string" },
                        "year": { "type": "integer" }
                    },
                    "required": [
                        "isbn", "amazon_url", "author", "language",
                        "pages", "publisher", "title", "year"
                    ]
                }
            }
        }
    })
}

/// Create the books module over the given repository
pub fn create_module(repository: Arc<dyn BookRepository>) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(BooksModule::new(repository)?))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::models::{BookFields, NewBook};
    use super::repository::SqlBookRepository;
    use super::*;
    use bookshelf_db::Database;

    /// Fresh in-memory store with the books table in place.
    pub async fn test_repository() -> (Database, SqlBookRepository) {
        let db = Database::in_memory().await.unwrap();
        let module = BooksModule::new(Arc::new(SqlBookRepository::new(db.pool().clone()))).unwrap();
        let migrations: Vec<_> = module
            .migrations()
            .into_iter()
            .map(|m| (module.name().to_string(), m))
            .collect();
        db.migrate(&migrations).await.unwrap();

        let repo = SqlBookRepository::new(db.pool().clone());
        (db, repo)
    }

    pub fn sample_book(isbn: &str) -> NewBook {
        NewBook {
            isbn: isbn.to_string(),
            fields: BookFields {
                amazon_url: "http://testaddress.com".to_string(),
                author: "Test Author".to_string(),
                language: "test".to_string(),
                pages: 123,
                publisher: "Test Publisher".to_string(),
                title: "Test Title".to_string(),
                year: 0,
            },
        }
    }
}
