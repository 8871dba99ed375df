use httpmock::prelude::*;
use link_preview::{
    BodyMode, Fetcher, FetcherConfig, HttpFetch, LinkResolver, MediaType, PreviewCache,
    PreviewError,
};
use url::Url;

fn url(server: &MockServer, path: &str) -> Url {
    Url::parse(&server.url(path)).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body_and_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/page").header("accept", "*/*");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body("<html><title>hi</title></html>");
    });

    let response = Fetcher::new()
        .fetch(&url(&server, "/page"), &[], BodyMode::Full)
        .await
        .unwrap();
    mock.assert();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), "text/html; charset=utf-8");
    assert_eq!(response.body, b"<html><title>hi</title></html>");
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET).path("/created");
        then.status(201).body("new");
    });

    for (path, expected) in [("/gone", 404), ("/created", 201)] {
        let err = Fetcher::new()
            .fetch(&url(&server, path), &[], BodyMode::Full)
            .await
            .unwrap_err();
        match err {
            PreviewError::HttpStatus { status, message } => {
                assert_eq!(status, expected);
                assert!(message.contains(path));
            }
            e => panic!("Expected HttpStatus error, got: {e:?}"),
        }
    }
}

#[tokio::test]
async fn test_partial_content_is_accepted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/range");
        then.status(206).body("part");
    });

    let response = Fetcher::new()
        .fetch(&url(&server, "/range"), &[], BodyMode::Full)
        .await
        .unwrap();
    assert_eq!(response.status, 206);
    assert_eq!(response.body, b"part");
}

#[tokio::test]
async fn test_redirects_report_final_url() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/old");
        then.status(302).header("location", "/new");
    });
    server.mock(|when, then| {
        when.method(GET).path("/new");
        then.status(200).body("moved");
    });

    let response = Fetcher::new()
        .fetch(&url(&server, "/old"), &[], BodyMode::Full)
        .await
        .unwrap();
    assert_eq!(response.url, url(&server, "/new"));
    assert_eq!(response.body, b"moved");
}

#[tokio::test]
async fn test_headers_only_probe() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/image.png")
            .header("accept-encoding", "*")
            .header("user-agent", "link-preview-test/1.0");
        then.status(200)
            .header("content-type", "image/png")
            .body(vec![0u8; 1500]);
    });

    let fetcher = Fetcher::new_with_config(FetcherConfig {
        user_agent: "link-preview-test/1.0".to_string(),
        ..Default::default()
    });
    let response = fetcher
        .fetch(
            &url(&server, "/image.png"),
            &[("Accept-Encoding", "*")],
            BodyMode::HeadersOnly,
        )
        .await
        .unwrap();
    mock.assert();

    assert_eq!(response.content_length(), Some(1500));
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_resolver_against_live_server() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/article");
        then.status(200)
            .header("content-type", "text/html")
            .body(
                r#"<html><head>
                    <meta property="og:type" content="music.album">
                    <meta property="og:title" content="Fish &amp; Chips">
                    <meta property="og:image" content="/cover.jpg">
                </head></html>"#,
            );
    });
    server.mock(|when, then| {
        when.method(GET).path("/cover.jpg");
        then.status(200)
            .header("content-type", "image/jpeg")
            .body(vec![0u8; 3000]);
    });

    let resolver = LinkResolver::new(PreviewCache::disabled());
    let preview = resolver
        .resolve_preview(&server.url("/article"))
        .await
        .unwrap();

    assert_eq!(preview.title, "Fish & Chips");
    assert_eq!(preview.media_type, MediaType::Audio);
    assert_eq!(preview.url, server.url("/article"));
    assert_eq!(preview.thumbnail_url, server.url("/cover.jpg"));
    assert_eq!(preview.content_length, 3000);
    assert_eq!(preview.content_type, "text/html");

    resolver.close().unwrap();
}
