//! Pruebas de la fachada HTTP con colaboradores deterministas.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use support_chatbot::{
    api::create_router,
    app_state::AppState,
    config::AppConfig,
    error::{ChatbotError, Result},
    llm::ChatModel,
    memory::ConversationMemory,
    models::DocumentChunk,
    rag::ChatOrchestrator,
    vector_store::Retriever,
};

// =============================================================================
// Helpers
// =============================================================================

struct StubRetriever {
    fail: bool,
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(&self, _question: &str) -> Result<Vec<DocumentChunk>> {
        if self.fail {
            return Err(ChatbotError::Retrieval("índice no disponible".into()));
        }
        Ok(vec![DocumentChunk::new(
            "Xalt Analytics offers data consulting.",
            "data.txt",
        )])
    }
}

/// Responde con la pregunta envuelta en `<p>`, o falla siempre.
struct EchoModel {
    fail: bool,
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(ChatbotError::ModelInvocation("invalid api token".into()));
        }
        let question = prompt
            .split("User Question:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nHTML Response:").next())
            .unwrap_or_default();
        Ok(format!("<p>{question}</p>"))
    }
}

fn make_state(retriever_fails: bool, model_fails: bool) -> (AppState, Arc<ConversationMemory>) {
    let memory = Arc::new(ConversationMemory::new(NonZeroUsize::new(100).unwrap(), None));
    let orchestrator = ChatOrchestrator::new(
        Arc::new(StubRetriever { fail: retriever_fails }),
        Arc::new(EchoModel { fail: model_fails }),
        memory.clone(),
    );
    (AppState::new(AppConfig::default(), orchestrator), memory)
}

fn post_chat(body: &str) -> Request<Body> {
    Request::post("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn valid_message_returns_html_response() {
    let (state, _) = make_state(false, false);
    let resp = create_router(state)
        .oneshot(post_chat(r#"{"message": "What services do you offer?", "session_id": "abc"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["response"], "<p>What services do you offer?</p>");
}

#[tokio::test]
async fn missing_or_empty_message_is_rejected() {
    for body in [
        r#"{}"#,
        r#"{"message": ""}"#,
        r#"{"message": null, "session_id": "x"}"#,
        r#"{"session_id": "x"}"#,
        r#"{"message": 5}"#,
        r#"{"message": ["hi"]}"#,
    ] {
        let (state, memory) = make_state(false, false);
        let resp = create_router(state).oneshot(post_chat(body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body(resp).await, json!({"error": "No query provided"}));
        assert_eq!(memory.session_count(), 0);
    }
}

#[tokio::test]
async fn unusable_bodies_are_server_errors() {
    let requests = [
        post_chat("{not json"),
        post_chat("[]"),
        post_chat(r#""What services do you offer?""#),
        post_chat(r#"{"message": "hi", "session_id": 7}"#),
        Request::post("/chat")
            .header("content-type", "text/plain")
            .body(Body::from(r#"{"message": "hi"}"#))
            .unwrap(),
        Request::post("/chat")
            .body(Body::from(r#"{"message": "hi"}"#))
            .unwrap(),
    ];

    for req in requests {
        let (state, memory) = make_state(false, false);
        let resp = create_router(state).oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert_eq!(memory.session_count(), 0);
    }
}

#[tokio::test]
async fn same_session_accumulates_turns_in_order() {
    let (state, memory) = make_state(false, false);
    let app = create_router(state);

    let questions = ["Hi", "What are your office hours?", "How do I book a consultation?"];
    for q in questions {
        let body = json!({"message": q, "session_id": "s1"}).to_string();
        let resp = app.clone().oneshot(post_chat(&body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let history = memory.get_history("s1");
    assert_eq!(history.message_count(), 2 * questions.len());
    for (turn, q) in history.turns().zip(questions) {
        assert_eq!(turn.user, q);
        assert_eq!(turn.assistant, format!("<p>{q}</p>"));
    }
}

#[tokio::test]
async fn sessions_are_isolated() {
    let (state, memory) = make_state(false, false);
    let app = create_router(state);

    for (session, q) in [("a", "first"), ("b", "second"), ("a", "third")] {
        let body = json!({"message": q, "session_id": session}).to_string();
        app.clone().oneshot(post_chat(&body)).await.unwrap();
    }

    let a: Vec<String> = memory.get_history("a").turns().map(|t| t.user.clone()).collect();
    let b: Vec<String> = memory.get_history("b").turns().map(|t| t.user.clone()).collect();
    assert_eq!(a, vec!["first", "third"]);
    assert_eq!(b, vec!["second"]);
}

#[tokio::test]
async fn missing_session_id_uses_default_session() {
    let (state, memory) = make_state(false, false);
    let resp = create_router(state)
        .oneshot(post_chat(r#"{"message": "Hello"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(memory.len("default"), 1);
}

#[tokio::test]
async fn retrieval_failure_is_a_server_error_without_turn() {
    let (state, memory) = make_state(true, false);
    let resp = create_router(state)
        .oneshot(post_chat(r#"{"message": "Hello", "session_id": "s"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("índice no disponible"));
    assert_eq!(memory.len("s"), 0);
}

#[tokio::test]
async fn model_failure_is_a_server_error_without_turn() {
    let (state, memory) = make_state(false, true);
    let resp = create_router(state)
        .oneshot(post_chat(r#"{"message": "Hello", "session_id": "s"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert_eq!(memory.len("s"), 0);
}

#[tokio::test]
async fn server_errors_can_be_redacted() {
    let (mut state, _) = make_state(false, true);
    state.config.expose_error_details = false;
    let resp = create_router(state)
        .oneshot(post_chat(r#"{"message": "Hello"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(resp).await, json!({"error": "Internal server error"}));
}

// =============================================================================
// GET /
// =============================================================================

#[tokio::test]
async fn root_serves_the_frontend_page() {
    let (state, _) = make_state(false, false);
    let expected = std::fs::read(state.config.frontend_dir.join("index.html")).unwrap();

    let resp = create_router(state)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    assert_eq!(bytes.to_vec(), expected);
}
