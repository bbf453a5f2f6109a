//! Question generation entry points.
//!
//! ## Run shape
//!
//! ```text
//! plan ──▶ N staggered batches ──▶ concat ──▶ dedup ──▶ top-up? ──▶ dedup ──▶ truncate
//!          (joined concurrently)                         (at most one)
//! ```
//!
//! A batch that times out, errors or returns an unparseable reply contributes
//! nothing and is recorded in its [`BatchReport`]; it never aborts the run.
//! The only fatal errors are configuration errors raised before any batch is
//! sent.

use crate::config::GenerationConfig;
use crate::error::{CallError, ExamError};
use crate::output::{BatchReport, GenerationOutput, GenerationStats};
use crate::pipeline::batch::{plan_batches, top_up_size, Batch};
use crate::pipeline::dedup::deduplicate;
use crate::pipeline::llm::{ChatPrompt, ModelClient};
use crate::pipeline::repair::parse_questions;
use crate::prompts::{generation_prompt, question_snippet};
use crate::question::{GeneratedQuestion, GenerationRequest};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Generate questions for `request` with a client built from `config`.
///
/// This is the primary generation entry point.
///
/// # Returns
/// `Ok(GenerationOutput)` whenever configuration is valid, even if every
/// batch failed (check `output.stats.shortfall`).
///
/// # Errors
/// - [`ExamError::NoCredentials`] before any batch is attempted
/// - [`ExamError::InvalidRequest`] when `request.count == 0`
pub async fn generate_questions(
    request: &GenerationRequest,
    config: &GenerationConfig,
) -> Result<GenerationOutput, ExamError> {
    QuestionGenerator::from_config(config.clone())?
        .generate(request)
        .await
}

/// A configured generator. Reuse it across runs to keep credential rotation
/// continuous.
pub struct QuestionGenerator {
    config: GenerationConfig,
    client: Arc<ModelClient>,
}

impl QuestionGenerator {
    /// # Errors
    /// [`ExamError::NoCredentials`] when the config carries no API key.
    pub fn from_config(config: GenerationConfig) -> Result<Self, ExamError> {
        let client = ModelClient::from_config(&config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Use an already-built client (custom transport, shared rotation).
    pub fn new(client: Arc<ModelClient>, config: GenerationConfig) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Run one generation request to completion.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, ExamError> {
        let started = Instant::now();
        if request.count == 0 {
            return Err(ExamError::InvalidRequest(
                "requested question count must be at least 1".into(),
            ));
        }
        if request.topic.trim().is_empty() {
            return Err(ExamError::InvalidRequest("topic must not be empty".into()));
        }

        // ── Step 1: Plan ─────────────────────────────────────────────────
        let batches = plan_batches(request, &self.config);
        let planned: usize = batches.iter().map(Batch::count).sum();
        info!(
            "Generating {} '{}' questions on '{}': {} batch(es), {} planned",
            request.count,
            request.question_type,
            request.topic,
            batches.len(),
            planned
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_generation_start(request.count, batches.len());
        }

        // ── Step 2: Dispatch all batches, join ───────────────────────────
        let total_batches = batches.len();
        let outcomes = join_all(
            batches
                .iter()
                .map(|batch| self.run_batch(batch, total_batches, &[], false)),
        )
        .await;

        let mut reports = Vec::with_capacity(total_batches + 1);
        let mut candidates: Vec<GeneratedQuestion> = Vec::new();
        for (questions, report) in outcomes {
            candidates.extend(questions);
            reports.push(report);
        }
        let mut candidate_count = candidates.len();

        // ── Step 3: Deduplicate the aggregate ────────────────────────────
        let threshold = self.config.similarity_threshold;
        let (mut accepted, mut duplicates_removed) = deduplicate(candidates, threshold);
        debug!(
            "Aggregate: {} candidates, {} duplicates removed",
            candidate_count, duplicates_removed
        );

        // ── Step 4: One top-up pass if short ─────────────────────────────
        let mut top_up_used = false;
        let mut planned = planned;
        if accepted.len() < request.count {
            let shortfall = request.count - accepted.len();
            let size = top_up_size(shortfall, &self.config);
            let avoid: Vec<String> = accepted
                .iter()
                .take(self.config.top_up_reference_limit)
                .map(|q| question_snippet(&q.question, self.config.top_up_snippet_chars))
                .collect();
            info!(
                "Short by {} after dedup; requesting {} more in a top-up batch",
                shortfall, size
            );
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_top_up(shortfall, size);
            }

            let top_up = Batch {
                index: total_batches,
                request: request.with_count(size),
                delay: std::time::Duration::ZERO,
            };
            let (extra, report) = self
                .run_batch(&top_up, total_batches + 1, &avoid, true)
                .await;
            reports.push(report);
            top_up_used = true;
            planned += size;
            candidate_count += extra.len();

            accepted.extend(extra);
            let (deduped, removed) = deduplicate(accepted, threshold);
            accepted = deduped;
            duplicates_removed += removed;
        }

        // ── Step 5: Truncate, never pad ──────────────────────────────────
        accepted.truncate(request.count);
        let produced = accepted.len();
        let shortfall = request.count - produced;
        if shortfall > 0 {
            warn!(
                "Returning {} of {} requested questions after top-up",
                produced, request.count
            );
        }

        let stats = GenerationStats {
            requested: request.count,
            produced,
            planned,
            batches: reports.len(),
            failed_batches: reports.iter().filter(|r| r.error.is_some()).count(),
            candidates: candidate_count,
            duplicates_removed,
            top_up_used,
            shortfall,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Generation complete: {}/{} questions, {} batch(es) ({} failed), {}ms",
            produced, request.count, stats.batches, stats.failed_batches, stats.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_generation_complete(request.count, produced);
        }

        Ok(GenerationOutput {
            questions: accepted,
            stats,
            batches: reports,
        })
    }

    /// Wait out the batch's stagger delay, call the model, parse the reply.
    ///
    /// Never fails: any error is folded into the report and an empty list.
    async fn run_batch(
        &self,
        batch: &Batch,
        total_batches: usize,
        avoid: &[String],
        top_up: bool,
    ) -> (Vec<GeneratedQuestion>, BatchReport) {
        if !batch.delay.is_zero() {
            tokio::time::sleep(batch.delay).await;
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(batch.index, total_batches);
        }
        let started = Instant::now();
        debug!(
            "Batch {}/{}: requesting {} question(s)",
            batch.index + 1,
            total_batches,
            batch.count()
        );

        let prompt = ChatPrompt::generation(generation_prompt(&batch.request, avoid));
        let result: Result<Vec<GeneratedQuestion>, CallError> =
            match self.client.dispatch(prompt).await {
                Ok(reply) => parse_questions(&reply).map_err(CallError::from),
                Err(e) => Err(e),
            };

        let (questions, error) = match result {
            Ok(mut questions) => {
                fill_request_defaults(&mut questions, &batch.request);
                debug!(
                    "Batch {}/{}: {} question(s)",
                    batch.index + 1,
                    total_batches,
                    questions.len()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_batch_complete(batch.index, total_batches, questions.len());
                }
                (questions, None)
            }
            Err(e) => {
                warn!("Batch {}/{} failed: {}", batch.index + 1, total_batches, e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_batch_error(batch.index, total_batches, &e.to_string());
                }
                (Vec::new(), Some(e))
            }
        };

        let report = BatchReport {
            index: batch.index,
            requested: batch.count(),
            produced: questions.len(),
            delay_ms: batch.delay.as_millis() as u64,
            top_up,
            duration_ms: started.elapsed().as_millis() as u64,
            error,
        };
        (questions, report)
    }
}

/// Fill fields the model left blank from the request that asked for them.
fn fill_request_defaults(questions: &mut [GeneratedQuestion], request: &GenerationRequest) {
    for q in questions {
        if q.topic.trim().is_empty() {
            q.topic = request.topic.clone();
        }
        if q.subject.trim().is_empty() {
            q.subject = request.subject.clone();
        }
        if q.difficulty.trim().is_empty() {
            q.difficulty = request.difficulty_label().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::credentials::{Credential, CredentialRotator};
    use crate::pipeline::llm::ChatTransport;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replies with `n` distinct questions, where `n` is read from the prompt.
    struct CountingTransport {
        calls: AtomicUsize,
    }

    impl ChatTransport for CountingTransport {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn send(&self, _c: Credential, prompt: ChatPrompt) -> BoxFuture<'_, Result<String, CallError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let n: usize = prompt
                    .user
                    .split_whitespace()
                    .nth(1)
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(0);
                let items: Vec<String> = (0..n)
                    .map(|i| {
                        format!(
                            r#"{{"question": "Distinct question {call}x{i} about vector{call}{i} quantity{i}{call}"}}"#
                        )
                    })
                    .collect();
                Ok(format!("[{}]", items.join(",")))
            })
        }
    }

    fn generator(config: GenerationConfig) -> (QuestionGenerator, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
        });
        let client = ModelClient::new(
            CredentialRotator::new(["k"]).unwrap(),
            transport.clone(),
            Duration::from_secs(5),
        );
        (QuestionGenerator::new(Arc::new(client), config), transport)
    }

    fn config() -> GenerationConfig {
        GenerationConfig::builder()
            .credentials(["k"])
            .stagger_ms(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn small_request_is_one_call() {
        let (generator, transport) = generator(config());
        let out = generator
            .generate(&GenerationRequest::new("Vectors", "Physics", 5))
            .await
            .unwrap();
        assert_eq!(out.questions.len(), 5);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(!out.stats.top_up_used);
        assert_eq!(out.questions[0].topic, "Vectors");
        assert_eq!(out.questions[0].difficulty, "medium");
    }

    #[tokio::test]
    async fn large_request_is_truncated_to_count() {
        let (generator, transport) = generator(config());
        let out = generator
            .generate(&GenerationRequest::new("Vectors", "Physics", 25))
            .await
            .unwrap();
        // ceil(25 × 1.2) = 30 → 3 batches, all distinct, truncated to 25.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.stats.candidates, 30);
        assert_eq!(out.questions.len(), 25);
        assert_eq!(out.stats.shortfall, 0);
    }

    #[tokio::test]
    async fn zero_count_is_rejected() {
        let (generator, transport) = generator(config());
        let err = generator
            .generate(&GenerationRequest::new("Vectors", "Physics", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ExamError::InvalidRequest(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_batch() {
        let err = generate_questions(
            &GenerationRequest::new("Vectors", "Physics", 5),
            &GenerationConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExamError::NoCredentials));
    }

    #[test]
    fn defaults_fill_only_blank_fields() {
        let request = GenerationRequest::new("Waves", "Physics", 1).difficulty(90);
        let mut qs = vec![crate::question::RawQuestion {
            question: "q".into(),
            topic: Some("Sound".into()),
            ..Default::default()
        }
        .into_question()];
        fill_request_defaults(&mut qs, &request);
        assert_eq!(qs[0].topic, "Sound");
        assert_eq!(qs[0].subject, "Physics");
        assert_eq!(qs[0].difficulty, "hard");
    }
}
