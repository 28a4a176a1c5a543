//! HTTP front end over a real socket

use asset_combiner::{AssetPipeline, AssetServer, CombinerConfig};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

const DEFINITIONS: &str = r#"
url: ~/assets
defaults: { version: "7" }
resource_sets:
  - name: siteCss
    type: css
    minifier: off
    resources:
      - path: ~/site.css
"#;

async fn start(dir: &TempDir, enable_metrics: bool) -> String {
    fs::write(dir.path().join("site.css"), "body{margin:0}").unwrap();
    fs::write(dir.path().join("defs.yaml"), DEFINITIONS).unwrap();
    let config = CombinerConfig {
        app_root: dir.path().to_string_lossy().into_owned(),
        definition_file: "defs.yaml".to_string(),
        enable_metrics,
        ..CombinerConfig::default()
    };
    let pipeline = Arc::new(AssetPipeline::new(config).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(AssetServer::new(pipeline));
    tokio::spawn(server.serve(listener));
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_serves_set_index_stats_and_metrics() {
    let dir = TempDir::new().unwrap();
    let base = start(&dir, true).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/assets/siteCss/7/", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "text/css; charset=utf-8"
    );
    let etag = response.headers()["etag"].to_str().unwrap().to_string();
    assert_eq!(response.text().await.unwrap(), "body{margin:0}");

    let revalidated = client
        .get(format!("{}/assets/siteCss/7/", base))
        .header("If-None-Match", etag)
        .send()
        .await
        .unwrap();
    assert_eq!(revalidated.status(), 304);

    let index = client
        .get(format!("{}/assets/", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let index: BTreeMap<String, String> = serde_json::from_str(&index).unwrap();
    assert_eq!(index["siteCss"], "/assets/siteCss/7/");

    let stats = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert!(stats["total_entries"].as_u64().unwrap() >= 2);

    let metrics = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("asset_combiner_requests_total{outcome=\"built\"} 1"));
    assert!(metrics.contains("asset_combiner_requests_total{outcome=\"not_modified\"} 1"));
}

#[tokio::test]
async fn test_unknown_paths_and_methods() {
    let dir = TempDir::new().unwrap();
    let base = start(&dir, false).await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("{}/assets/nope/1/", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let outside = client.get(format!("{}/elsewhere", base)).send().await.unwrap();
    assert_eq!(outside.status(), 404);

    // Metrics disabled: the path falls through to the pipeline
    let metrics = client.get(format!("{}/metrics", base)).send().await.unwrap();
    assert_eq!(metrics.status(), 404);

    let post = client
        .post(format!("{}/assets/siteCss/7/", base))
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), 405);

    let head = client
        .head(format!("{}/assets/siteCss/7/", base))
        .send()
        .await
        .unwrap();
    assert_eq!(head.status(), 200);
}
