//! # Common Test Utilities
//!
//! `TestApp` spawns a real server on a random port with a temporary Embedded Store,
//! an in-memory Durable Store and an `httpmock::MockServer` standing in for the AI
//! provider and the fact-check services.

// Allow unused code because this is a test utility module, and not all
// functions might be used by every test file that includes it.
#![allow(unused)]

use anyhow::Result;
use async_trait::async_trait;
use axiant::{providers::db::durable::MemoryDurableStore, User};
use axiant_server::{
    auth::issue_token,
    config, router,
    state::{assemble_state, AppState},
};
use axiant_test_utils::TestSetup;
use axum::serve;
use core_access::{AccountError, OtpNotifier};
use httpmock::MockServer;
use reqwest::Client;
use serde_json::{json, Value};
use std::{
    fs::File,
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex, Once},
};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

static TRACING: Once = Once::new();

pub fn setup_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();
    });
}

pub const TEST_JWT_SECRET: &str = "test-secret";

/// Records every code the account service issues, instead of mailing it.
#[derive(Debug, Default)]
pub struct CapturingNotifier {
    codes: Mutex<Vec<(String, String)>>,
}

impl CapturingNotifier {
    pub fn last_code(&self, email: &str) -> Option<String> {
        self.codes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| e == email)
            .map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl OtpNotifier for CapturingNotifier {
    async fn send_verification(&self, user: &User, code: &str) -> Result<(), AccountError> {
        self.codes
            .lock()
            .unwrap()
            .push((user.email.clone(), code.to_string()));
        Ok(())
    }

    async fn send_password_reset(&self, user: &User, code: &str) -> Result<(), AccountError> {
        self.send_verification(user, code).await
    }
}

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mock_server: MockServer,
    pub app_state: AppState,
    /// The Durable Store behind the server's pool.
    pub remote: MemoryDurableStore,
    pub notifier: Arc<CapturingNotifier>,
    _config_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the application server and returns a `TestApp` instance.
    ///
    /// The AI provider is the mock server's `/v1/chat/completions`; of the fact
    /// services only Google Fact Check is configured, also on the mock server.
    pub async fn spawn() -> Result<Self> {
        setup_tracing();
        let mock_server = MockServer::start_async().await;
        let config_dir = tempdir()?;
        let db_path = config_dir.path().join("chat_cache.sqlite");
        let config_path = config_dir.path().join("config.yml");

        let config_content = format!(
            r#"
port: 0
embedded_db_path: "{}"
jwt_secret: "{}"
request_timeout_secs: 2
sync_on_startup: false
fact_sources:
  google:
    api_key: "google-test-key"
    base_url: "{}"
providers:
  default:
    provider: "local"
    api_url: "{}"
    api_key: null
    model_name: "mock-chat-model"
"#,
            db_path.to_string_lossy(),
            TEST_JWT_SECRET,
            mock_server.base_url(),
            mock_server.url("/v1/chat/completions")
        );
        let mut file = File::create(&config_path)?;
        file.write_all(config_content.as_bytes())?;

        let config = config::get_config(Some(config_path.to_string_lossy().as_ref()))?;
        let setup = TestSetup::new().await?;
        let mut app_state = assemble_state(config, setup.pool.clone()).await?;
        let notifier = Arc::new(CapturingNotifier::default());
        app_state.accounts = app_state.accounts.clone().with_notifier(notifier.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let state_for_server = app_state.clone();
        let server_handle = tokio::spawn(async move {
            let app = router::create_router(state_for_server);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Ok(Self {
            address,
            client: Client::new(),
            mock_server,
            app_state,
            remote: setup.remote,
            notifier,
            _config_dir: config_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// A session token for `user_id`, as the login endpoint would issue it.
    pub fn token_for(&self, user_id: &str) -> String {
        issue_token(user_id, TEST_JWT_SECRET).unwrap()
    }

    /// Signs up, verifies and logs in; returns `(user_id, token)`.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> (String, String) {
        let signup: Value = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({"username": username, "email": email, "password": password}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let user_id = signup["userId"].as_str().unwrap().to_string();

        let otp = self.notifier.last_code(email).unwrap();
        let verify = self
            .client
            .post(self.url("/api/auth/verify"))
            .json(&json!({"email": email, "otp": otp}))
            .send()
            .await
            .unwrap();
        assert!(verify.status().is_success());

        let login: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let token = login["token"].as_str().unwrap().to_string();
        (user_id, token)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
