use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use bookshelf_app::App;
use bookshelf_db::Database;
use bookshelf_kernel::settings::Settings;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> (App, Router) {
    let database = Database::in_memory().await.unwrap();
    let app = App::with_database(Settings::default(), database).unwrap();
    app.migrate().await.unwrap();

    sqlx::query(
        "INSERT INTO books (isbn, amazon_url, author, language, pages, publisher, title, year)
         VALUES ('1234567', 'http://testaddress.com', 'Test Author', 'test', 123,
                 'Test Publisher', 'Test Title', 0)",
    )
    .execute(app.database.pool())
    .await
    .unwrap();

    let router = app.router();
    (app, router)
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn seeded_book() -> Value {
    json!({
        "isbn": "1234567",
        "amazon_url": "http://testaddress.com",
        "author": "Test Author",
        "language": "test",
        "pages": 123,
        "publisher": "Test Publisher",
        "title": "Test Title",
        "year": 0
    })
}

#[tokio::test]
async fn seeded_book_is_listed_and_fetched() {
    let (_app, router) = app().await;

    let (status, body) = call(&router, Method::GET, "/books", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "books": [seeded_book()] }));

    let (status, body) = call(&router, Method::GET, "/books/1234567", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "book": seeded_book() }));

    let (status, body) = call(&router, Method::GET, "/books/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn full_crud_cycle() {
    let (_app, router) = app().await;
    let created = json!({
        "isbn": "5555",
        "amazonUrl": "http://testaddress3.com",
        "author": "Test Author3",
        "language": "test3",
        "pages": 1234,
        "publisher": "Test Publisher3",
        "title": "Test Title3",
        "year": 2024
    });

    let (status, body) = call(&router, Method::POST, "/books", Some(created)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["book"]["amazon_url"], "http://testaddress3.com");

    let (_, body) = call(&router, Method::GET, "/books", None).await;
    assert_eq!(body["books"].as_array().unwrap().len(), 2);

    let mut replacement = seeded_book();
    replacement["isbn"] = json!("5555");
    replacement["author"] = json!("Test Update");
    let (status, body) = call(&router, Method::PUT, "/books/5555", Some(replacement)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["author"], "Test Update");
    assert_eq!(body["book"]["pages"], 123);

    let (status, body) = call(&router, Method::DELETE, "/books/5555", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Book deleted" }));

    let (_, body) = call(&router, Method::GET, "/books", None).await;
    assert_eq!(body["books"].as_array().unwrap().len(), 1);

    let (status, _) = call(&router, Method::GET, "/books/5555", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_writes_change_nothing() {
    let (_app, router) = app().await;

    let (status, _) = call(&router, Method::POST, "/books", Some(json!({ "year": 2000 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_update = seeded_book();
    bad_update["isbn"] = json!("333");
    bad_update["author"] = json!("Test Update");
    bad_update["amazon_url"] = json!(2324);
    let (status, body) = call(&router, Method::PUT, "/books/1234567", Some(bad_update)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = call(&router, Method::PUT, "/books/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call(&router, Method::GET, "/books", None).await;
    assert_eq!(body, json!({ "books": [seeded_book()] }));
}

#[tokio::test]
async fn responses_carry_request_id() {
    let (_app, router) = app().await;
    let response = router
        .oneshot(Request::builder().uri("/books").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn openapi_lists_book_routes() {
    let (_app, router) = app().await;
    let (status, body) = call(&router, Method::GET, "/docs/openapi.json", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/books"]["post"].is_object());
    assert!(body["paths"]["/books/{isbn}"]["delete"].is_object());
    assert!(body["components"]["schemas"]["Book"].is_object());
}

#[tokio::test]
async fn migrations_are_recorded_once() {
    let (app, _router) = app().await;
    assert_eq!(app.migrate().await.unwrap(), 0);
}
