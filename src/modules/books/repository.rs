use async_trait::async_trait;
use sqlx::SqlitePool;

use super::models::{Book, BookFields, NewBook};

const BOOK_COLUMNS: &str = "isbn, amazon_url, author, language, pages, publisher, title, year";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("book '{0}' not found")]
    NotFound(String),

    #[error("book '{0}' already exists")]
    Conflict(String),

    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence boundary for books. Every call is a single store round trip.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Every book, in insertion order
    async fn list_all(&self) -> RepositoryResult<Vec<Book>>;

    async fn get_by_isbn(&self, isbn: &str) -> RepositoryResult<Book>;

    /// Insert a new row; `Conflict` if the isbn is taken
    async fn create(&self, book: NewBook) -> RepositoryResult<Book>;

    /// Overwrite every mutable field of the row addressed by `isbn`
    async fn update_by_isbn(&self, isbn: &str, fields: BookFields) -> RepositoryResult<Book>;

    async fn delete_by_isbn(&self, isbn: &str) -> RepositoryResult<()>;
}

/// [`BookRepository`] backed by the `books` table.
#[derive(Clone)]
pub struct SqlBookRepository {
    pool: SqlitePool,
}

impl SqlBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for SqlBookRepository {
    async fn list_all(&self) -> RepositoryResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY rowid"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn get_by_isbn(&self, isbn: &str) -> RepositoryResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE isbn = ?"
        ))
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(isbn.to_string()))
    }

    async fn create(&self, book: NewBook) -> RepositoryResult<Book> {
        let NewBook { isbn, fields } = book;

        let result = sqlx::query_as::<_, Book>(&format!(
            "INSERT INTO books ({BOOK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&isbn)
        .bind(&fields.amazon_url)
        .bind(&fields.author)
        .bind(&fields.language)
        .bind(fields.pages)
        .bind(&fields.publisher)
        .bind(&fields.title)
        .bind(fields.year)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => {
                tracing::debug!(isbn = %created.isbn, "book inserted");
                Ok(created)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RepositoryError::Conflict(isbn))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_by_isbn(&self, isbn: &str, fields: BookFields) -> RepositoryResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            "UPDATE books SET amazon_url = ?, author = ?, language = ?, pages = ?, \
             publisher = ?, title = ?, year = ? WHERE isbn = ? RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&fields.amazon_url)
        .bind(&fields.author)
        .bind(&fields.language)
        .bind(fields.pages)
        .bind(&fields.publisher)
        .bind(&fields.title)
        .bind(fields.year)
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(isbn.to_string()))
    }

    async fn delete_by_isbn(&self, isbn: &str) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE isbn = ?")
            .bind(isbn)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(isbn.to_string()));
        }
        Ok(())
    }
}
