use std::sync::Arc;
use trustlens_browser::actions::BrowserActions;
use trustlens_browser::{classify_response, BrowserEngine, FetchOutcome};
use trustlens_core::BrowserConfig;

#[tokio::test]
#[ignore = "Requires Chrome browser to be installed"]
async fn test_browser_engine_launch() {
    let engine = BrowserEngine::launch(&BrowserConfig::default(), 0).await;
    assert!(engine.is_ok(), "Failed to launch browser engine");
}

#[tokio::test]
#[ignore = "Requires Chrome browser to be installed"]
async fn test_navigation_in_isolated_context() {
    let engine = Arc::new(
        BrowserEngine::launch(&BrowserConfig::default(), 0)
            .await
            .expect("launch"),
    );

    let page = engine.open_page(0).await.expect("open page");
    page.navigate("https://example.com").await.expect("navigate");
    let markup = page.content().await.expect("content");
    let url = page.current_url().await.expect("url");
    page.close().await;

    assert!(url.starts_with("https://example.com"));
    assert!(matches!(
        classify_response(&url, &markup),
        FetchOutcome::Success(_)
    ));
    engine.reset_context(0).await.expect("reset context");
}

#[tokio::test]
#[ignore = "Requires Chrome browser to be installed"]
async fn test_contexts_do_not_share_cookies() {
    let engine = BrowserEngine::launch(&BrowserConfig::default(), 0)
        .await
        .expect("launch");

    let first = engine.open_page(0).await.expect("open first");
    first.navigate("https://example.com").await.expect("navigate");
    first
        .set_cookies(&[trustlens_auth::StoredCookie {
            name: "session-check".to_string(),
            value: "1".to_string(),
            domain: "example.com".to_string(),
            path: "/".to_string(),
            expires: None,
            http_only: false,
            secure: true,
        }])
        .await
        .expect("set cookie");

    let second = engine.open_page(1).await.expect("open second");
    second.navigate("https://example.com").await.expect("navigate");
    let cookies = second.cookies().await.expect("cookies");
    assert!(cookies.iter().all(|c| c.name != "session-check"));

    first.close().await;
    second.close().await;
}
