use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use docs_rag::answer::{rag_search, AnswerOrchestrator};
use docs_rag::completion::{ChatBackend, ChatMessage};
use docs_rag::config::parse_config;
use docs_rag::context::AppContext;
use docs_rag::embedding::EmbeddingClient;
use docs_rag::error::{Error, Result};
use docs_rag::index::memory::InMemoryIndex;
use docs_rag::jobs::JobQueue;
use docs_rag::providers::{ClientConfig, Provider, ProviderRegistry};
use docs_rag::search::SearchParams;
use docs_rag::server;

const KEYWORDS: [&str; 3] = ["alpha", "beta", "gamma"];

/// One dimension per keyword, holding its occurrence count.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingClient for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }
    fn dims(&self) -> usize {
        KEYWORDS.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|k| lower.matches(k).count() as f32)
                    .collect()
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeChat {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn complete(&self, client: &ClientConfig, messages: &[ChatMessage]) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push(messages[0].content.clone());
        Ok(format!("fake answer via {}", client.provider))
    }
}

struct Env {
    _tmp: TempDir,
    ctx: AppContext,
    chat: Arc<FakeChat>,
}

/// Three one-chunk files: alpha.md embeds to (1,0,0), beta.md to (0,1,0),
/// gamma.md to (0,0,1).
async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("alpha.md"), "Alpha release notes.\nShips the new parser.").unwrap();
    fs::write(docs.join("beta.md"), "Beta channel setup.").unwrap();
    fs::write(docs.join("gamma.md"), "Gamma deployment runbook.").unwrap();

    let config = parse_config(&format!(
        r#"
[db]
path = "{root}/data/rag.sqlite"

[workspace]
root = "{root}"

[server]
bind = "127.0.0.1:0"

[queue]
workers = 1
capacity = 4
"#,
        root = root.display()
    ))
    .unwrap();

    let chat = Arc::new(FakeChat::default());
    let mut ctx = AppContext::from_parts(
        config,
        Arc::new(InMemoryIndex::with_dims(KEYWORDS.len())),
        Arc::new(KeywordEmbedder),
        chat.clone(),
    )
    .unwrap();
    ctx.orchestrator = Arc::new(AnswerOrchestrator::new(
        ProviderRegistry::default().with_api_key(Provider::Groq, "test-key"),
        chat.clone(),
    ));

    let stats = ctx
        .coordinator
        .ingest(Path::new("docs"), None, None)
        .await
        .unwrap();
    assert_eq!(stats.new_files, 3);

    Env {
        _tmp: tmp,
        ctx,
        chat,
    }
}

#[tokio::test]
async fn test_exact_match_ranks_first() {
    let env = setup().await;
    let params = SearchParams::new("alpha", Some(5), Some(0.0)).unwrap();
    let (results, metrics) = env.ctx.engine.search(&params).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].file_path, "docs/alpha.md");
    assert_eq!(results[0].similarity, 1.0);
    assert_eq!(results[1].similarity, 0.414);
    assert_eq!(results[0].content_snippet, "Alpha release notes. Ships the new parser.");

    assert_eq!(metrics.top_similarity, 1.0);
    assert_eq!(metrics.avg_similarity, 0.609);
    assert_eq!(metrics.results_returned, 3);
    assert_eq!(metrics.results_filtered, 0);
}

#[tokio::test]
async fn test_threshold_filters_and_counts() {
    let env = setup().await;
    let params = SearchParams::new("alpha", Some(5), Some(0.5)).unwrap();
    let (results, metrics) = env.ctx.engine.search(&params).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(metrics.results_filtered, 2);
}

#[tokio::test]
async fn test_nothing_close_enough_returns_empty() {
    let env = setup().await;
    // "delta" embeds to the origin: every chunk is at distance 1, similarity 0.5.
    let params = SearchParams::new("delta", Some(5), Some(0.9)).unwrap();
    let (results, metrics) = env.ctx.engine.search(&params).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(metrics.results_filtered, 3);
    assert_eq!(metrics.top_similarity, 0.0);
    assert_eq!(metrics.avg_similarity, 0.0);
    assert_eq!(metrics.results_returned, 0);
}

#[tokio::test]
async fn test_results_respect_bounds() {
    let env = setup().await;
    for top_k in 1..=4 {
        for min_similarity in [0.0, 0.3, 0.45, 0.6, 1.0] {
            let params = SearchParams::new("alpha beta", Some(top_k), Some(min_similarity)).unwrap();
            let (results, metrics) = env.ctx.engine.search(&params).await.unwrap();
            assert!(results.len() <= top_k);
            assert!(results.iter().all(|r| r.similarity >= min_similarity));
            assert!(results
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity));
            assert_eq!(metrics.results_returned, results.len());
        }
    }
}

#[tokio::test]
async fn test_rag_search_composes_context_and_metrics() {
    let env = setup().await;
    let params = SearchParams::new("alpha", Some(2), None).unwrap();
    let response = rag_search(&env.ctx.engine, &env.ctx.orchestrator, &params, Provider::Groq)
        .await
        .unwrap();

    assert_eq!(response.query, "alpha");
    assert_eq!(response.answer, "fake answer via groq");
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.generation_metrics.sources_used, 2);

    let context = format!(
        "{}\n\n---\n\n{}",
        response.results[0].content_snippet, response.results[1].content_snippet
    );
    assert_eq!(
        response.generation_metrics.context_tokens,
        context.chars().count() / 4
    );

    let prompts = env.chat.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&context));
    assert!(prompts[0].contains("Question: alpha"));
}

#[tokio::test]
async fn test_rag_search_without_credential_fails_before_retrieval() {
    let env = setup().await;
    if std::env::var("DEEPSEEK_API_KEY").is_ok() {
        return;
    }
    let params = SearchParams::new("alpha", None, None).unwrap();
    let err = rag_search(&env.ctx.engine, &env.ctx.orchestrator, &params, Provider::DeepSeek)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(env.chat.prompts.lock().unwrap().is_empty());
}

// ============ HTTP ============

async fn spawn_server(env: &Env) -> String {
    let (queue, _workers) = JobQueue::start(&env.ctx.config.queue, env.ctx.coordinator.clone());
    let app = server::router(env.ctx.clone(), queue);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_health_and_files() {
    let env = setup().await;
    let base = spawn_server(&env).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let files: serde_json::Value = client
        .get(format!("{}/files", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(files["total"], 3);
    assert_eq!(files["files"].as_array().unwrap().len(), 3);
    assert!(files["files"][0]["created_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_http_search_validation() {
    let env = setup().await;
    let base = spawn_server(&env).await;
    let client = reqwest::Client::new();

    for body in [
        serde_json::json!({"query": "   "}),
        serde_json::json!({"query": "alpha", "top_k": 21}),
        serde_json::json!({"query": "alpha", "top_k": 0}),
        serde_json::json!({"query": "alpha", "min_similarity": 1.5}),
        serde_json::json!({"query": "alpha", "provider": "claude"}),
    ] {
        let response = client
            .post(format!("{}/search/rag", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "body: {}", body);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["error"]["code"], "bad_request");
    }

    for query in ["", " \t ", "\u{7}"] {
        let response = client
            .post(format!("{}/search/raw", base))
            .json(&serde_json::json!({"query": query, "provider": "groq"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query: {:?}", query);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["error"]["code"], "bad_request");
    }
    assert!(env.chat.prompts.lock().unwrap().is_empty());

    let response = client
        .post(format!("{}/search", base))
        .body("not json")
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_http_search_and_rag() {
    let env = setup().await;
    let base = spawn_server(&env).await;
    let client = reqwest::Client::new();

    let search: serde_json::Value = client
        .post(format!("{}/search", base))
        .json(&serde_json::json!({"query": "gamma", "top_k": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["results"][0]["file_path"], "docs/gamma.md");
    assert_eq!(search["retrieval_metrics"]["results_returned"], 1);

    let rag: serde_json::Value = client
        .post(format!("{}/search/rag", base))
        .json(&serde_json::json!({"query": "gamma", "provider": "groq"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rag["answer"], "fake answer via groq");
    assert_eq!(rag["generation_metrics"]["sources_used"], 3);
}

#[tokio::test]
async fn test_http_missing_credential_is_configuration_error() {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return;
    }
    let env = setup().await;
    let base = spawn_server(&env).await;

    let response = reqwest::Client::new()
        .post(format!("{}/search/raw", base))
        .json(&serde_json::json!({"query": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"]["code"], "configuration_error");
}

#[tokio::test]
async fn test_http_ingest_is_queued_and_processed() {
    let env = setup().await;
    let notes = env.ctx.config.workspace.root.join("notes");
    fs::create_dir_all(&notes).unwrap();
    fs::write(notes.join("todo.txt"), "beta rollout checklist").unwrap();

    let base = spawn_server(&env).await;
    let client = reqwest::Client::new();

    let queued: serde_json::Value = client
        .post(format!("{}/ingest/fs", base))
        .json(&serde_json::json!({"path": "/notes"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queued["queued"], true);
    assert_eq!(queued["path"], "notes");
    assert!(!queued["job_id"].as_str().unwrap().is_empty());

    let mut found = false;
    for _ in 0..50 {
        if env.ctx.index.find_file("notes/todo.txt").await.unwrap().is_some() {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "queued ingestion never completed");
}
