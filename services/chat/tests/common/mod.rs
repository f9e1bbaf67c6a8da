//! Harness for the end-to-end scenarios: a freshly reset world (Kafka
//! topic + consumer group + SQL schema), the full component stack wired
//! the way `serve` wires it, and a thin typed HTTP client.
//!
//! Requires reachable Kafka and PostgreSQL; override the endpoints with
//! `MURMUR_KAFKA_BOOTSTRAP_SERVERS` and `MURMUR_POSTGRESQL_URL`.

use murmur_chat::api::{self, AppState};
use murmur_chat::bootstrap;
use murmur_chat::config::AppConfig;
use murmur_chat::ids;
use murmur_chat::projection::{handler_group, Projection};
use murmur_chat::queries::QueryService;
use murmur_chat::store;
use murmur_chat::{app, observability};
use murmur_log::admin::LogAdmin;
use murmur_log::{barrier, EventPublisher, KafkaEventBus, ProjectionRouter};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct TestApp {
    pub config: AppConfig,
    pub pool: PgPool,
    pub client: TestClient,
    cancel: CancellationToken,
    router_task: tokio::task::JoinHandle<anyhow::Result<()>>,
    http_task: tokio::task::JoinHandle<()>,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::load(None).expect("load config");
    // Tight cadences keep the barrier snappy in tests.
    config.cqrs.check_are_events_processed_interval_ms = 200;
    config.kafka.consumer.offset_commit_interval_ms = 200;
    config.kafka.consumer.nack_resend_sleep_ms = 200;
    config
}

/// Wipe the world: consumer group, topic, schema; arms the latch.
pub async fn reset_world(config: &AppConfig) {
    app::reset(config.clone()).await.expect("reset");
}

impl TestApp {
    /// Wire the full stack the way `serve` does, on an ephemeral port.
    /// Call [`reset_world`] first for a clean slate.
    pub async fn launch(config: AppConfig) -> Self {
        let metrics =
            observability::init_observability("murmur-chat-test", &config.logger, &config.otlp);

        let pool = store::connect(&config.postgresql).await.expect("connect");
        store::run_migrations(&pool).await.expect("migrations");

        let admin = LogAdmin::new(&config.kafka).expect("admin");
        admin.create_topic().await.expect("create topic");

        ids::arm_fast_forward_latch(&pool).await.expect("arm latch");

        let projection = Arc::new(Projection::new(
            pool.clone(),
            &config.projections.chat_user_view,
        ));
        let queries = Arc::new(QueryService::new(pool.clone()));
        let bus = Arc::new(KafkaEventBus::new(&config.kafka).expect("event bus"));

        let cancel = CancellationToken::new();
        let router = Arc::new(
            ProjectionRouter::new(
                &config.kafka,
                handler_group(projection.clone()),
                config.sleep_before_event(),
            )
            .expect("router"),
        );
        let router_task = tokio::spawn({
            let router = router.clone();
            let cancel = cancel.clone();
            async move { router.run(cancel).await }
        });

        barrier::wait_for_caught_up(
            &config.kafka,
            config.check_events_processed_interval(),
            &cancel,
        )
        .await
        .expect("barrier");

        bootstrap::run_sequence_fast_forward(&pool)
            .await
            .expect("fast-forward");

        let state = AppState {
            bus: bus as Arc<dyn EventPublisher>,
            pool: pool.clone(),
            projection,
            queries,
            metrics,
        };
        let router_http = api::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let address = listener.local_addr().expect("local addr");
        let http_cancel = cancel.clone();
        let http_task = tokio::spawn(async move {
            axum::serve(listener, router_http.into_make_service())
                .with_graceful_shutdown(async move { http_cancel.cancelled().await })
                .await
                .expect("http server");
        });

        let client = TestClient::new(format!("http://{address}"));
        Self {
            config,
            pool,
            client,
            cancel,
            router_task,
            http_task,
        }
    }

    /// Block until the consumer group catches up with the topic: the
    /// read-after-write fence the scenarios lean on after every mutation.
    pub async fn barrier(&self) {
        barrier::wait_for_caught_up(
            &self.config.kafka,
            self.config.check_events_processed_interval(),
            &self.cancel,
        )
        .await
        .expect("barrier");
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.http_task.await;
        let _ = self.router_task.await;
        self.pool.close().await;
    }
}

pub struct TestClient {
    http: reqwest::Client,
    base: String,
}

impl TestClient {
    fn new(base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn create_chat(&self, user_id: i64, title: &str, participant_ids: &[i64]) -> i64 {
        let response = self
            .http
            .post(self.url("/chat"))
            .header("X-UserId", user_id)
            .json(&json!({"title": title, "participantIds": participant_ids}))
            .send()
            .await
            .expect("create chat");
        assert!(response.status().is_success(), "{}", response.status());
        response.json::<Value>().await.expect("body")["id"]
            .as_i64()
            .expect("chat id")
    }

    pub async fn edit_chat(
        &self,
        user_id: i64,
        chat_id: i64,
        title: &str,
        participant_ids: &[i64],
        blog: bool,
    ) {
        let response = self
            .http
            .put(self.url("/chat"))
            .header("X-UserId", user_id)
            .json(&json!({
                "id": chat_id,
                "title": title,
                "participantIds": participant_ids,
                "blog": blog
            }))
            .send()
            .await
            .expect("edit chat");
        assert!(response.status().is_success(), "{}", response.status());
    }

    pub async fn pin_chat(&self, user_id: i64, chat_id: i64, pin: bool) {
        let response = self
            .http
            .put(self.url(&format!("/chat/{chat_id}/pin?pin={pin}")))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("pin chat");
        assert!(response.status().is_success(), "{}", response.status());
    }

    pub async fn add_participants(&self, user_id: i64, chat_id: i64, participant_ids: &[i64]) {
        let response = self
            .http
            .put(self.url(&format!("/chat/{chat_id}/participant")))
            .header("X-UserId", user_id)
            .json(&json!({"participantIds": participant_ids}))
            .send()
            .await
            .expect("add participants");
        assert!(response.status().is_success(), "{}", response.status());
    }

    /// Chat list page with optional keyset continuation.
    pub async fn search_chats(&self, user_id: i64, size: i32, cursor: Option<&Value>) -> Vec<Value> {
        let mut url = format!("{}?size={size}", self.url("/chat/search"));
        if let Some(cursor) = cursor {
            url.push_str(&format!(
                "&pinned={}&lastUpdateDateTime={}&id={}",
                cursor["pinned"],
                urlencode(cursor["lastUpdateDateTime"].as_str().unwrap()),
                cursor["id"]
            ));
        }
        let response = self
            .http
            .get(url)
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("search chats");
        assert!(response.status().is_success(), "{}", response.status());
        response.json().await.expect("chat list")
    }

    pub async fn chat_of(&self, user_id: i64, chat_id: i64) -> Option<Value> {
        self.search_chats(user_id, 100, None)
            .await
            .into_iter()
            .find(|chat| chat["id"].as_i64() == Some(chat_id))
    }

    /// Create a message, retrying while the chat projection has not landed
    /// yet (HTTP 418).
    pub async fn create_message(&self, user_id: i64, chat_id: i64, content: &str) -> i64 {
        for _ in 0..100 {
            let response = self
                .http
                .post(self.url(&format!("/chat/{chat_id}/message")))
                .header("X-UserId", user_id)
                .json(&json!({"content": content}))
                .send()
                .await
                .expect("create message");
            if response.status() == reqwest::StatusCode::IM_A_TEAPOT {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                continue;
            }
            assert!(response.status().is_success(), "{}", response.status());
            return response.json::<Value>().await.expect("body")["id"]
                .as_i64()
                .expect("message id");
        }
        panic!("chat {chat_id} never became visible");
    }

    pub async fn edit_message(&self, user_id: i64, chat_id: i64, message_id: i64, content: &str) {
        let response = self
            .http
            .put(self.url(&format!("/chat/{chat_id}/message")))
            .header("X-UserId", user_id)
            .json(&json!({"id": message_id, "content": content}))
            .send()
            .await
            .expect("edit message");
        assert!(response.status().is_success(), "{}", response.status());
    }

    pub async fn delete_message(&self, user_id: i64, chat_id: i64, message_id: i64) {
        let response = self
            .http
            .delete(self.url(&format!("/chat/{chat_id}/message/{message_id}")))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("delete message");
        assert!(response.status().is_success(), "{}", response.status());
    }

    pub async fn read_message(&self, user_id: i64, chat_id: i64, message_id: i64) {
        let response = self
            .http
            .put(self.url(&format!("/chat/{chat_id}/message/{message_id}/read")))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("read message");
        assert!(response.status().is_success(), "{}", response.status());
    }

    pub async fn make_blog_post(&self, user_id: i64, chat_id: i64, message_id: i64) {
        let response = self
            .http
            .put(self.url(&format!("/chat/{chat_id}/message/{message_id}/blog-post")))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("make blog post");
        assert!(response.status().is_success(), "{}", response.status());
    }

    pub async fn search_messages(&self, user_id: i64, chat_id: i64) -> Vec<Value> {
        let response = self
            .http
            .get(self.url(&format!("/chat/{chat_id}/message/search?size=100")))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("search messages");
        assert!(response.status().is_success(), "{}", response.status());
        response.json().await.expect("message list")
    }

    pub async fn search_blogs(&self, user_id: i64) -> Vec<Value> {
        let response = self
            .http
            .get(self.url("/blog/search"))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("search blogs");
        assert!(response.status().is_success(), "{}", response.status());
        response.json().await.expect("blog list")
    }

    pub async fn search_comments(&self, user_id: i64, blog_id: i64) -> Vec<Value> {
        let response = self
            .http
            .get(self.url(&format!("/blog/{blog_id}/comment/search")))
            .header("X-UserId", user_id)
            .send()
            .await
            .expect("search comments");
        assert!(response.status().is_success(), "{}", response.status());
        response.json().await.expect("comment list")
    }
}

fn urlencode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('+', "%2B")
        .replace(':', "%3A")
}
