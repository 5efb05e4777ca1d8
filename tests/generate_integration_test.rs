use serde_json::{Value as JsonValue, json};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use video_bridge::Config;

const MOCK_VIDEO_URL: &str =
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4";

/// Test harness that runs the bridge in-process
struct TestServer {
    handle: JoinHandle<anyhow::Result<()>>,
    port: u16,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(simulated_delay_ms: u64) -> Self {
        // Only open when debugging
        // tracing_subscriber::fmt::init();

        let port = portpicker::pick_unused_port().expect("No available port");

        let config = Config {
            listen_on_port: port,
            simulated_delay_ms,
            tunnel: "none".into(),
            ..Default::default()
        };

        let handle = tokio::spawn(video_bridge::run(config));

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        // Poll until server is ready
        for _ in 0..200 {
            if let Ok(response) = client
                .get(format!("http://127.0.0.1:{port}/health"))
                .send()
                .await
                && response.status().is_success()
            {
                break;
            }

            sleep(Duration::from_millis(10)).await;
        }

        TestServer {
            handle,
            port,
            client,
        }
    }

    fn url(&self) -> String {
        format!("http://127.0.0.1:{}/generate", self.port)
    }

    async fn generate(&self, body: JsonValue) -> reqwest::Response {
        self.client.post(self.url()).json(&body).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn test_generate_returns_mock_result() {
    let server = TestServer::start(50).await;

    let response = server.generate(json!({ "prompt": "sunset over a lake" })).await;
    assert_eq!(response.status(), 200);

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["video_url"], MOCK_VIDEO_URL);
    assert_eq!(body["message"], "Generated on College Server");
    assert_eq!(body.as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn test_video_url_does_not_depend_on_prompt() {
    let server = TestServer::start(10).await;

    let mut urls = Vec::new();
    for prompt in ["a", "a cat on a skateboard", "", "日本語のプロンプト"] {
        let response = server.generate(json!({ "prompt": prompt })).await;
        assert_eq!(response.status(), 200);
        let body: JsonValue = response.json().await.unwrap();
        urls.push(body["video_url"].as_str().unwrap().to_string());
    }

    assert!(urls.iter().all(|url| url == MOCK_VIDEO_URL));
}

#[tokio::test]
async fn test_response_waits_for_simulated_delay() {
    let delay = Duration::from_millis(400);
    let server = TestServer::start(delay.as_millis() as u64).await;

    let start = Instant::now();
    let response = server.generate(json!({ "prompt": "slow" })).await;
    assert_eq!(response.status(), 200);
    assert!(start.elapsed() >= delay);
}

#[tokio::test]
async fn test_missing_prompt_still_succeeds() {
    let server = TestServer::start(10).await;

    let response = server.generate(json!({})).await;
    assert_eq!(response.status(), 200);

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["video_url"], MOCK_VIDEO_URL);

    let response = server.generate(json!({ "prompt": null, "style": "anime" })).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_non_string_prompt_still_succeeds() {
    let server = TestServer::start(10).await;

    for prompt in [json!(123), json!(["a"]), json!({ "t": "a" }), json!(true)] {
        let response = server.generate(json!({ "prompt": prompt })).await;
        assert_eq!(response.status(), 200, "prompt {prompt}");

        let body: JsonValue = response.json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["video_url"], MOCK_VIDEO_URL);
        assert_eq!(body["message"], "Generated on College Server");
    }
}

#[tokio::test]
async fn test_json_that_is_not_an_object_fails() {
    let server = TestServer::start(10).await;

    for body in [json!([]), JsonValue::Null, json!("a cat on a skateboard")] {
        let response = server.generate(body.clone()).await;
        assert_eq!(response.status(), 500, "body {body}");
    }
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let server = TestServer::start(10).await;

    let response = server
        .client
        .post(server.url())
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Not declared as JSON at all
    let response = server
        .client
        .post(server.url())
        .body("prompt=a cat")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_only_post_is_routed() {
    let server = TestServer::start(10).await;

    let response = server.client.get(server.url()).send().await.unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let delay = Duration::from_millis(300);
    let server = TestServer::start(delay.as_millis() as u64).await;

    let start = Instant::now();
    let (a, b, c) = tokio::join!(
        server.generate(json!({ "prompt": "one" })),
        server.generate(json!({ "prompt": "two" })),
        server.generate(json!({ "prompt": "three" })),
    );
    assert_eq!(a.status(), 200);
    assert_eq!(b.status(), 200);
    assert_eq!(c.status(), 200);

    // The pause does not serialize requests
    assert!(start.elapsed() < delay * 3);
}

#[tokio::test]
async fn test_cat_on_skateboard_with_default_delay() {
    let server = TestServer::start(5000).await;

    let start = Instant::now();
    let response = server
        .generate(json!({ "prompt": "a cat on a skateboard" }))
        .await;
    assert_eq!(response.status(), 200);
    assert!(start.elapsed() >= Duration::from_secs(5));

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "status": "success",
            "video_url": MOCK_VIDEO_URL,
            "message": "Generated on College Server",
        })
    );
}
