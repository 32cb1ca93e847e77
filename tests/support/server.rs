use tempfile::TempDir;
use wayfarer::config::Config;
use wayfarer::gateway::run_gateway_with_listener;

/// In-process gateway bound to an ephemeral port, backed by a throwaway
/// database and an upstream completion API of the test's choosing
/// (usually a wiremock server).
pub struct TestServer {
    pub base_url: String,
    _workspace: TempDir,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(upstream_url: &str) -> Self {
        let workspace = TempDir::new().expect("temp workspace should be created");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral gateway listener should bind");
        let port = listener
            .local_addr()
            .expect("ephemeral gateway listener should expose local address")
            .port();

        let mut config = Config::default();
        config.database.path = workspace.path().join("wayfarer.db");
        config.llm.api_key = Some("sk-test-key".to_string());
        config.llm.base_url = upstream_url.trim_end_matches('/').to_string();
        config.llm.model = "gpt-test".to_string();

        let handle =
            tokio::spawn(async move { run_gateway_with_listener(listener, config).await });

        let base_url = format!("http://127.0.0.1:{port}");
        wait_until_ready(&base_url).await;

        Self {
            base_url,
            _workspace: workspace,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn create_thread(&self, client: &reqwest::Client) -> String {
        let response = client
            .post(self.url("/create-thread"))
            .send()
            .await
            .expect("create-thread should respond");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        body["thread_id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn wait_until_ready(base_url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(response) = client.get(base_url).send().await
            && response.status().is_success()
        {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("gateway did not become ready at {base_url}");
}
