//! Resilient wrapper (B): a circuit breaker plus retry/backoff policy
//! around [`crate::client::Client`].
//!
//! The circuit breaker state lives for the lifetime of one wrapped client
//! (SPEC_FULL.md §3, lifecycle rules) — it is not shared across clones or
//! forks, since a fork represents an independent tier/model and should not
//! trip or recover in lockstep with its parent.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::client::{ChatBackend, Client};
use crate::error::{Error, Result};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{Message, StreamChunk, Tier, ToolCall, ToolDefinition, Usage};

const FAILURE_THRESHOLD: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Three-state breaker: `closed` admits everything, `open` fails fast,
/// `half-open` admits exactly one trial call after the cooldown elapses.
struct CircuitBreaker {
    state: Mutex<State>,
    consecutive_failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Closed),
            consecutive_failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    /// Returns `Err` if the breaker should fail the call fast without
    /// invoking the inner client. Transitions `Open` -> `HalfOpen` itself
    /// once the cooldown has elapsed.
    fn admit(&self) -> Result<()> {
        let mut state = self.state.lock().expect("circuit breaker lock poisoned");
        match *state {
            State::Closed => Ok(()),
            State::HalfOpen => Ok(()),
            State::Open => {
                let opened_at = *self.opened_at.lock().expect("circuit breaker lock poisoned");
                let cooled_down = opened_at.is_some_and(|t| t.elapsed() >= COOLDOWN);
                if cooled_down {
                    *state = State::HalfOpen;
                    log::info!("circuit breaker: open -> half-open after cooldown");
                    Ok(())
                } else {
                    Err(Error::llm_unavailable("circuit breaker is open"))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().expect("circuit breaker lock poisoned");
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if *state != State::Closed {
            log::info!("circuit breaker: {:?} -> closed on success", *state);
        }
        *state = State::Closed;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().expect("circuit breaker lock poisoned");
        match *state {
            State::HalfOpen => {
                log::warn!("circuit breaker: half-open -> open on trial failure");
                *state = State::Open;
                *self.opened_at.lock().expect("circuit breaker lock poisoned") = Some(Instant::now());
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            State::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= FAILURE_THRESHOLD {
                    log::warn!("circuit breaker: closed -> open after {failures} consecutive failures");
                    *state = State::Open;
                    *self.opened_at.lock().expect("circuit breaker lock poisoned") = Some(Instant::now());
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                }
            }
            State::Open => {}
        }
    }
}

/// A [`Client`] wrapped with a circuit breaker and retry policy. This is
/// the type the agent loop, router, and pipeline agents hold — never the
/// bare [`Client`] directly.
pub struct ResilientClient {
    inner: Client,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl ResilientClient {
    pub fn new(inner: Client, retry: RetryConfig) -> Self {
        Self {
            inner,
            breaker: Arc::new(CircuitBreaker::new()),
            retry,
        }
    }

    /// Creates a fork with an independent tier and its own fresh circuit
    /// breaker — a tripped breaker on the parent must not block the
    /// fork's calls, since they may be to a different model entirely.
    pub fn fork(&self) -> Self {
        Self {
            inner: self.inner.fork(),
            breaker: Arc::new(CircuitBreaker::new()),
            retry: self.retry,
        }
    }

    pub fn set_tier(&self, tier: Tier) {
        self.inner.set_tier(tier);
    }

    pub fn tier(&self) -> Tier {
        self.inner.tier()
    }

    pub fn set_temperature(&self, temperature: f32) {
        self.inner.set_temperature(temperature);
    }

    pub fn temperature(&self) -> f32 {
        self.inner.temperature()
    }

    pub fn context_window(&self) -> u32 {
        self.inner.context_window()
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub async fn check_health(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.check_health(cancel).await
    }

    /// Unary chat through the breaker and retry policy. Each retry attempt
    /// consults the breaker afresh, so a breaker trip mid-retry-loop stops
    /// further attempts immediately.
    pub async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
        retry_with_backoff(&self.retry, || async {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            self.breaker.admit()?;
            match self.inner.chat(cancel, messages, tools, system_prompt).await {
                Ok(v) => {
                    self.breaker.record_success();
                    Ok(v)
                }
                Err(e) => {
                    self.breaker.record_failure();
                    Err(e)
                }
            }
        })
        .await
    }

    /// Streaming chat: not retried. A `Done` chunk records a breaker
    /// success; an `Error` chunk records a failure. The breaker is still
    /// consulted before opening the stream at all.
    pub async fn stream_chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = StreamChunk> + Send>>> {
        self.breaker.admit()?;
        let breaker = self.breaker.clone();
        let inner = self
            .inner
            .stream_chat(cancel, messages, tools, system_prompt)
            .await;
        let inner = match inner {
            Ok(s) => s,
            Err(e) => {
                breaker.record_failure();
                return Err(e);
            }
        };

        use futures::StreamExt;
        let gated = inner.inspect(move |chunk| match chunk {
            StreamChunk::Done(_) => breaker.record_success(),
            StreamChunk::Error(_) => breaker.record_failure(),
            _ => {}
        });
        Ok(Box::pin(gated))
    }
}

#[async_trait::async_trait]
impl ChatBackend for ResilientClient {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
        ResilientClient::chat(self, cancel, messages, tools, system_prompt).await
    }

    async fn stream_chat(
        &self,
        cancel: CancellationToken,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = StreamChunk> + Send>>> {
        ResilientClient::stream_chat(self, cancel, messages, tools, system_prompt).await
    }

    fn tier(&self) -> Tier {
        ResilientClient::tier(self)
    }

    fn set_tier(&self, tier: Tier) {
        ResilientClient::set_tier(self, tier)
    }

    fn temperature(&self) -> f32 {
        ResilientClient::temperature(self)
    }

    fn set_temperature(&self, temperature: f32) {
        ResilientClient::set_temperature(self, temperature)
    }

    fn context_window(&self) -> u32 {
        ResilientClient::context_window(self)
    }

    async fn check_health(&self, cancel: &CancellationToken) -> Result<()> {
        ResilientClient::check_health(self, cancel).await
    }
}
