use serde::{Deserialize, Serialize};

/// A catalog entry, one row of the `books` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    /// Unique identifier; never changes after creation
    pub isbn: String,
    #[serde(alias = "amazonUrl")]
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

/// Request model for creating a new book. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub isbn: String,
    #[serde(flatten)]
    pub fields: BookFields,
}

/// Every mutable column of a book, written as a whole on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFields {
    #[serde(alias = "amazonUrl")]
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

/// Request model for replacing a book.
///
/// Fields are optional only so a type-valid body can be told apart from a
/// complete one; an update still overwrites every mutable field. `isbn` is
/// accepted but never used: the path decides which row is written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default, alias = "amazonUrl")]
    pub amazon_url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub pages: Option<i64>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
}

impl BookUpdate {
    /// Turn the update into a complete field set, or name the missing fields.
    pub fn into_fields(self) -> Result<BookFields, Vec<&'static str>> {
        let mut missing = Vec::new();
        if self.amazon_url.is_none() {
            missing.push("amazon_url");
        }
        if self.author.is_none() {
            missing.push("author");
        }
        if self.language.is_none() {
            missing.push("language");
        }
        if self.pages.is_none() {
            missing.push("pages");
        }
        if self.publisher.is_none() {
            missing.push("publisher");
        }
        if self.title.is_none() {
            missing.push("title");
        }
        if self.year.is_none() {
            missing.push("year");
        }

        match self {
            BookUpdate {
                amazon_url: Some(amazon_url),
                author: Some(author),
                language: Some(language),
                pages: Some(pages),
                publisher: Some(publisher),
                title: Some(title),
                year: Some(year),
                ..
            } => Ok(BookFields {
                amazon_url,
                author,
                language,
                pages,
                publisher,
                title,
                year,
            }),
            _ => Err(missing),
        }
    }
}

impl Book {
    pub fn from_parts(isbn: String, fields: BookFields) -> Self {
        Self {
            isbn,
            amazon_url: fields.amazon_url,
            author: fields.author,
            language: fields.language,
            pages: fields.pages,
            publisher: fields.publisher,
            title: fields.title,
            year: fields.year,
        }
    }
}

/// `{"book": ...}` response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct BookEnvelope {
    pub book: Book,
}

/// `{"books": [...]}` response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct BooksEnvelope {
    pub books: Vec<Book>,
}

/// `{"message": ...}` response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: String,
}
