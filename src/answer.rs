//! Answer generation on top of retrieval.
//!
//! [`AnswerOrchestrator`] turns a question (plus, for RAG, the retrieved
//! snippets) into a single-message prompt and sends it to the chosen
//! provider. [`rag_search`] composes retrieval and generation into the full
//! RAG response.
//!
//! Credentials are resolved before any network traffic, so a missing API
//! key fails fast as a configuration error. Latency is measured around the
//! completion call alone and reported in milliseconds, rounded to 0.1.

use std::sync::Arc;
use std::time::Instant;

use crate::completion::{ChatBackend, ChatMessage};
use crate::error::Result;
use crate::models::{GenerationMetrics, RagSearchResponse, RawSearchResponse};
use crate::providers::{ClientConfig, Provider, ProviderRegistry};
use crate::search::{distinct_sources, elapsed_ms, RetrievalEngine, SearchParams};

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub struct AnswerOrchestrator {
    registry: ProviderRegistry,
    backend: Arc<dyn ChatBackend>,
}

impl AnswerOrchestrator {
    pub fn new(registry: ProviderRegistry, backend: Arc<dyn ChatBackend>) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Answer `query` grounded in `context_chunks`.
    pub async fn answer(
        &self,
        query: &str,
        context_chunks: &[String],
        provider: Provider,
    ) -> Result<(String, f64)> {
        let client = self.registry.resolve(provider)?;
        self.answer_with(&client, query, context_chunks).await
    }

    /// Answer `query` with no retrieved context.
    pub async fn answer_raw(&self, query: &str, provider: Provider) -> Result<(String, f64)> {
        let client = self.registry.resolve(provider)?;
        self.dispatch(&client, query.to_string()).await
    }

    async fn answer_with(
        &self,
        client: &ClientConfig,
        query: &str,
        context_chunks: &[String],
    ) -> Result<(String, f64)> {
        let prompt = build_prompt(query, &join_context(context_chunks));
        self.dispatch(client, prompt).await
    }

    async fn dispatch(&self, client: &ClientConfig, prompt: String) -> Result<(String, f64)> {
        let messages = [ChatMessage::user(prompt)];
        let started = Instant::now();
        let answer = self.backend.complete(client, &messages).await?;
        let latency_ms = elapsed_ms(started);
        tracing::debug!(provider = %client.provider, model = %client.model, latency_ms, "completion received");
        Ok((answer, latency_ms))
    }
}

/// Retrieve, then generate an answer from the retrieved snippets.
pub async fn rag_search(
    engine: &RetrievalEngine,
    orchestrator: &AnswerOrchestrator,
    params: &SearchParams,
    provider: Provider,
) -> Result<RagSearchResponse> {
    // Fail on a missing key before the embedding call.
    let client = orchestrator.registry().resolve(provider)?;

    let (results, retrieval_metrics) = engine.search(params).await?;

    let context_chunks: Vec<String> = results.iter().map(|r| r.content_snippet.clone()).collect();
    let context_tokens = estimate_tokens(&join_context(&context_chunks));

    let (answer, llm_latency_ms) = orchestrator
        .answer_with(&client, &params.query, &context_chunks)
        .await?;

    let generation_metrics = GenerationMetrics {
        llm_latency_ms,
        context_tokens,
        sources_used: distinct_sources(&results),
    };

    Ok(RagSearchResponse {
        query: params.query.clone(),
        answer,
        results,
        retrieval_metrics,
        generation_metrics,
    })
}

/// Plain completion with no retrieval step.
pub async fn raw_search(
    orchestrator: &AnswerOrchestrator,
    query: &str,
    provider: Provider,
) -> Result<RawSearchResponse> {
    let (answer, latency_ms) = orchestrator.answer_raw(query, provider).await?;
    Ok(RawSearchResponse {
        provider: provider.to_string(),
        answer,
        latency_ms,
    })
}

pub fn join_context(chunks: &[String]) -> String {
    chunks.join(CONTEXT_SEPARATOR)
}

/// Rough token count: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        r#"You are an expert engineer helping a colleague understand and navigate a codebase.

You are given a question and documentation or source snippets retrieved from their repository.

Instructions:
- Rely on the retrieved snippets as much as possible and ground statements in them.
- Give a clear, correct and complete answer, as a senior engineer would.
- If the snippets only partly cover the question, fill the gaps with your own knowledge.
- Mark every statement that is not supported by the snippets inline with:
  (general knowledge — not in retrieved docs)

Format:
Write plain text, not markdown headings. Organize the answer into exactly three numbered sections:

1. Complete Answer (Docs + General Knowledge):
   A thorough explanation that synthesizes the snippets rather than re-quoting them, with examples or code where useful.

2. Coverage Summary:
   One to three sentences on whether the retrieved context fully, partially, or barely covers the question.

3. Helpful Files to Review:
   Two to five of the most relevant retrieved files, one line each, saying why each is useful.

Context:
{context}

Question: {query}

Answer:
"#
    )
}
