//! Catalog client tests
//!
//! Fetching, parsing and the built-in fallback against a mock server.

use castplayer::api::{Catalog, CatalogClient};
use mockito::Server;

const CATALOG_JSON: &str = r#"{
    "categories": [
        {
            "name": "Movies",
            "videos": [
                {
                    "description": "A short film",
                    "sources": ["http://media.example/short.mp4"],
                    "subtitle": "By Someone",
                    "thumb": "images/short.jpg",
                    "title": "Short"
                },
                {
                    "description": "No source yet",
                    "sources": [],
                    "subtitle": "By Nobody",
                    "thumb": "images/none.jpg",
                    "title": "Upcoming"
                }
            ]
        }
    ]
}"#;

#[tokio::test]
async fn test_fetch_parses_first_category() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/videos.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(CATALOG_JSON)
        .create_async()
        .await;

    let client = CatalogClient::with_url(format!("{}/videos.json", server.url()));
    let catalog = tokio_test::assert_ok!(client.fetch().await);

    mock.assert_async().await;
    assert_eq!(catalog.len(), 2);
    let first = catalog.get(0).unwrap();
    assert_eq!(first.title, "Short");
    assert_eq!(first.source_url(), Some("http://media.example/short.mp4"));
    assert!(catalog.get(1).unwrap().source_url().is_none());
}

#[tokio::test]
async fn test_fetch_http_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/videos.json")
        .with_status(500)
        .create_async()
        .await;

    let client = CatalogClient::with_url(format!("{}/videos.json", server.url()));
    let err = client.fetch().await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_fetch_invalid_json() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/videos.json")
        .with_status(200)
        .with_body("<html>not a catalog</html>")
        .create_async()
        .await;

    let client = CatalogClient::with_url(format!("{}/videos.json", server.url()));
    assert!(client.fetch().await.is_err());
}

#[tokio::test]
async fn test_fetch_or_builtin_falls_back() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/videos.json")
        .with_status(404)
        .create_async()
        .await;

    let client = CatalogClient::with_url(format!("{}/videos.json", server.url()));
    let catalog = client.fetch_or_builtin().await;
    assert_eq!(catalog, Catalog::builtin());
}

#[tokio::test]
async fn test_fetch_or_builtin_uses_remote_catalog() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/videos.json")
        .with_status(200)
        .with_body(CATALOG_JSON)
        .create_async()
        .await;

    let client = CatalogClient::with_url(format!("{}/videos.json", server.url()));
    let catalog = client.fetch_or_builtin().await;
    assert_eq!(catalog.len(), 2);
}
