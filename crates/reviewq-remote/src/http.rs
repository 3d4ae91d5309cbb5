use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::sync::RwLock;

use reviewq_core::aggregate::StatsSnapshot;
use reviewq_core::config::RemoteConfig;
use reviewq_core::types::{
    ActionCard, CardId, ConversationThread, ObjectiveId, QueueFilter, QueuePage, ViewBucket,
};

use crate::error::RemoteError;
use crate::{QueueService, Result};

pub struct HttpQueueService {
    base: Url,
    token: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl fmt::Debug for HttpQueueService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQueueService")
            .field("base", &self.base.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl HttpQueueService {
    /// Build a client from config. The token is read from `token_env` once,
    /// here; later changes go through [`QueueService::set_token`].
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            RemoteError::Setup(format!("invalid base_url '{}': {e}", config.base_url))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("reviewq/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Setup(format!("failed to initialize HTTP client: {e}")))?;
        Ok(Self {
            base,
            token: RwLock::new(config.token()),
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Setup(format!("base_url '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let builder = self.client.request(method, self.url(segments)?);
        let token = self.token.read().ok().and_then(|t| t.clone());
        Ok(match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, what: &str, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::from_transport(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::from_transport(&e))?;
        if !status.is_success() {
            tracing::debug!(what, status = status.as_u16(), "remote call failed");
            return Err(RemoteError::from_status(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait]
impl QueueService for HttpQueueService {
    async fn list_queue(&self, status: ViewBucket, filter: QueueFilter) -> Result<QueuePage> {
        let req = self
            .request(Method::GET, &["api", "queue"])?
            .query(&[("status", status.as_str()), ("filter", filter.as_str())]);
        self.send("list_queue", req).await
    }

    async fn approve(&self, id: &CardId) -> Result<ActionCard> {
        let req = self.request(Method::POST, &["api", "queue", id.as_str(), "approve"])?;
        self.send("approve", req).await
    }

    async fn override_card(&self, id: &CardId, reason: &str) -> Result<ActionCard> {
        let req = self
            .request(Method::POST, &["api", "queue", id.as_str(), "override"])?
            .json(&json!({ "reason": reason }));
        self.send("override", req).await
    }

    async fn edit(&self, id: &CardId, content: &str) -> Result<ActionCard> {
        let req = self
            .request(Method::PATCH, &["api", "queue", id.as_str()])?
            .json(&json!({ "proposedAction": content }));
        self.send("edit", req).await
    }

    async fn escalate(&self, id: &CardId, reason: &str) -> Result<ActionCard> {
        let req = self
            .request(Method::POST, &["api", "queue", id.as_str(), "escalate"])?
            .json(&json!({ "reason": reason }));
        self.send("escalate", req).await
    }

    async fn get_stats(&self) -> Result<StatsSnapshot> {
        let req = self.request(Method::GET, &["api", "stats"])?;
        self.send("get_stats", req).await
    }

    async fn get_conversation(&self, objective: &ObjectiveId) -> Result<ConversationThread> {
        let req = self.request(
            Method::GET,
            &["api", "objectives", objective.as_str(), "conversation"],
        )?;
        self.send("get_conversation", req).await
    }

    fn invalidate_session(&self) {
        if let Ok(mut t) = self.token.write() {
            *t = None;
        }
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut t) = self.token.write() {
            *t = token;
        }
    }

    fn has_session(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const CARD: &str = r#"{
        "id": "c1",
        "objectiveId": "obj-1",
        "objectiveStatus": "waiting_on_you",
        "riskLevel": "high",
        "category": "email",
        "confidence": 62,
        "summary": "Reschedule Friday sync",
        "proposedAction": "Sure, Monday works.",
        "sender": {"name": "Ada"},
        "createdAt": "2026-03-02T09:00:00Z",
        "updatedAt": "2026-03-02T09:00:00Z"
    }"#;

    fn service(server: &mockito::Server, token: Option<&str>) -> HttpQueueService {
        let cfg = RemoteConfig {
            base_url: server.url(),
            token_env: "REVIEWQ_TEST_TOKEN_UNSET".into(),
            request_timeout_secs: 5,
        };
        let svc = HttpQueueService::new(&cfg).unwrap();
        svc.set_token(token.map(str::to_string));
        svc
    }

    #[tokio::test]
    async fn list_queue_sends_status_filter_and_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/queue")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "needs_decision".into()),
                Matcher::UrlEncoded("filter".into(), "high_risk".into()),
            ]))
            .match_header("authorization", "Bearer t0k")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"cards": [{CARD}], "counts": {{"needsDecision": 4, "handledByAI": 9}}}}"#
            ))
            .create_async()
            .await;

        let page = service(&server, Some("t0k"))
            .list_queue(ViewBucket::NeedsDecision, QueueFilter::HighRisk)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(page.cards.len(), 1);
        assert_eq!(page.cards[0].confidence, 62);
        let counts = page.counts.unwrap();
        assert_eq!(counts.needs_decision, 4);
        assert_eq!(counts.handled_by_ai, 9);
    }

    #[tokio::test]
    async fn edit_patches_proposed_action() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/queue/c1")
            .match_body(Matcher::Json(
                serde_json::json!({"proposedAction": "Sure, Monday works."}),
            ))
            .with_status(200)
            .with_body(CARD)
            .create_async()
            .await;

        let card = service(&server, None)
            .edit(&CardId::from("c1"), "Sure, Monday works.")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(card.proposed_action, "Sure, Monday works.");
    }

    #[tokio::test]
    async fn override_sends_reason() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/queue/c1/override")
            .match_body(Matcher::Json(serde_json::json!({"reason": "wrong tone"})))
            .with_status(200)
            .with_body(CARD)
            .create_async()
            .await;
        service(&server, None)
            .override_card(&CardId::from("c1"), "wrong tone")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/queue/c1/approve")
            .with_status(401)
            .with_body("token expired")
            .create_async()
            .await;
        let err = service(&server, Some("old"))
            .approve(&CardId::from("c1"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Unauthorized("token expired".into()));
    }

    #[tokio::test]
    async fn conflict_and_server_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/queue/c1/escalate")
            .with_status(409)
            .create_async()
            .await;
        server
            .mock("GET", "/api/stats")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;
        let svc = service(&server, None);
        assert!(matches!(
            svc.escalate(&CardId::from("c1"), "legal").await,
            Err(RemoteError::Conflict(_))
        ));
        assert!(matches!(
            svc.get_stats().await,
            Err(RemoteError::Server { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/objectives/obj-1/conversation")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;
        let err = service(&server, None)
            .get_conversation(&ObjectiveId::from("obj-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
        assert!(err.is_retryable_read());
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let cfg = RemoteConfig {
            base_url: "http://127.0.0.1:9".into(),
            token_env: "REVIEWQ_TEST_TOKEN_UNSET".into(),
            request_timeout_secs: 2,
        };
        let err = HttpQueueService::new(&cfg)
            .unwrap()
            .get_stats()
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn invalidate_session_drops_token() {
        let svc = HttpQueueService::new(&RemoteConfig::default()).unwrap();
        svc.set_token(Some("abc".into()));
        assert!(svc.has_session());
        svc.invalidate_session();
        assert!(!svc.has_session());
    }

    #[test]
    fn bad_base_url_is_a_setup_error() {
        let cfg = RemoteConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpQueueService::new(&cfg),
            Err(RemoteError::Setup(_))
        ));
    }
}
