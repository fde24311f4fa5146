//! Model invocation: the `ChatBackend` seam plus timeout and retry.
//!
//! Both invokers funnel through [`invoke`], so both stages share one
//! failure contract: a tagged [`InvocationResult`], never a panic, never an
//! error string that has to be sniffed for a prefix.
//!
//! ## Retry Strategy
//!
//! Timeouts, 429s and transport failures are transient. Exponential backoff
//! (`retry_backoff * 2^(attempt-1)`) spaces out calls to a recovering endpoint:
//! with 500 ms base the waits are 500 ms → 1 s → 2 s, capped at
//! [`MAX_RETRY_BACKOFF`]. Authentication errors and empty answers are
//! returned immediately.

use crate::config::InvocationPolicy;
use crate::error::StageError;
use crate::pipeline::message::ModelMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Upper bound on a single wait between attempts.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Per-call sampling knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvocationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

/// A raw answer from a backend, before invocation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// "Send messages, get text": the whole surface the pipeline needs from a
/// hosted model.
///
/// The production implementation wraps an `edgequake_llm::LLMProvider`
/// ([`crate::provider::EdgequakeBackend`]); tests substitute fakes.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name for logs (`openai/gpt-4o-mini`).
    fn name(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ModelMessage],
        options: &InvocationOptions,
    ) -> Result<ModelReply, StageError>;
}

/// A successful model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// The model's text, verbatim.
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Number of calls made, including the successful one.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Outcome of one invoker stage.
pub type InvocationResult = Result<Completion, StageError>;

/// Call `backend` with timeout and bounded retry.
pub async fn invoke(
    backend: &dyn ChatBackend,
    messages: &[ModelMessage],
    options: &InvocationOptions,
    policy: &InvocationPolicy,
) -> InvocationResult {
    let start = Instant::now();
    let mut last_err = StageError::EmptyResult;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay(policy.retry_backoff, attempt);
            warn!(
                "{}: retry {}/{} after {:?}",
                backend.name(),
                attempt,
                policy.max_retries,
                backoff
            );
            sleep(backoff).await;
        }

        let outcome = match timeout(policy.timeout, backend.chat(messages, options)).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout {
                secs: policy.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(reply) if reply.text.is_empty() => {
                warn!("{}: model returned an empty answer", backend.name());
                return Err(StageError::EmptyResult);
            }
            Ok(reply) => {
                let duration = start.elapsed();
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    backend.name(),
                    reply.input_tokens,
                    reply.output_tokens,
                    duration
                );
                return Ok(Completion {
                    text: reply.text,
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    attempts: attempt + 1,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", backend.name(), attempt + 1, e);
                let transient = e.is_transient();
                last_err = e;
                if !transient {
                    break;
                }
            }
        }
    }

    Err(last_err)
}

/// Wait before retry number `attempt` (1-based). Saturates instead of
/// overflowing for large attempt counts.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted list of replies and records every call.
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Result<ModelReply, StageError>>>,
        pub(crate) calls: Mutex<Vec<Vec<ModelMessage>>>,
        delay: Duration,
    }

    impl ScriptedBackend {
        pub(crate) fn new(script: Vec<Result<ModelReply, StageError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: &[ModelMessage],
            _options: &InvocationOptions,
        ) -> Result<ModelReply, StageError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelReply::text("default reply")))
        }
    }

    pub(crate) fn fast_policy(max_retries: u32) -> InvocationPolicy {
        InvocationPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn transport_error() -> StageError {
        StageError::Provider {
            kind: ProviderErrorKind::Transport,
            detail: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let backend = ScriptedBackend::new(vec![Ok(ModelReply {
            text: "hello".into(),
            input_tokens: 12,
            output_tokens: 3,
        })]);
        let out = invoke(
            &backend,
            &[ModelMessage::user("hi")],
            &InvocationOptions::default(),
            &fast_policy(1),
        )
        .await
        .unwrap();
        assert_eq!(out.text, "hello");
        assert_eq!(out.attempts, 1);
        assert_eq!(out.input_tokens, 12);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let backend = ScriptedBackend::new(vec![Err(transport_error()), Ok(ModelReply::text("ok"))]);
        let out = invoke(&backend, &[], &InvocationOptions::default(), &fast_policy(1))
            .await
            .unwrap();
        assert_eq!(out.text, "ok");
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let backend = ScriptedBackend::new(vec![
            Err(transport_error()),
            Err(transport_error()),
            Err(transport_error()),
        ]);
        let err = invoke(&backend, &[], &InvocationOptions::default(), &fast_policy(1))
            .await
            .unwrap_err();
        assert_eq!(err, transport_error());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn auth_error_is_not_retried() {
        let auth = StageError::Provider {
            kind: ProviderErrorKind::Auth,
            detail: "401".into(),
        };
        let backend = ScriptedBackend::new(vec![Err(auth.clone()), Ok(ModelReply::text("never"))]);
        let err = invoke(&backend, &[], &InvocationOptions::default(), &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(err, auth);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_answer_is_empty_result() {
        let backend = ScriptedBackend::new(vec![Ok(ModelReply::text(""))]);
        let err = invoke(&backend, &[], &InvocationOptions::default(), &fast_policy(2))
            .await
            .unwrap_err();
        assert_eq!(err, StageError::EmptyResult);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let backend = ScriptedBackend::new(vec![]).with_delay(Duration::from_secs(5));
        let err = invoke(&backend, &[], &InvocationOptions::default(), &fast_policy(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Timeout { .. }), "got: {err:?}");
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 10), MAX_RETRY_BACKOFF);
        assert_eq!(backoff_delay(base, 40), MAX_RETRY_BACKOFF);
        assert_eq!(backoff_delay(Duration::ZERO, u32::MAX), Duration::ZERO);
    }

    #[tokio::test]
    async fn many_retries_do_not_overflow() {
        let backend = ScriptedBackend::new((0..41).map(|_| Err(transport_error())).collect());
        let policy = InvocationPolicy {
            timeout: Duration::from_millis(200),
            max_retries: 40,
            retry_backoff: Duration::ZERO,
        };
        let err = invoke(&backend, &[], &InvocationOptions::default(), &policy)
            .await
            .unwrap_err();
        assert_eq!(err, transport_error());
        assert_eq!(backend.call_count(), 41);
    }
}
