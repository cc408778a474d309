//! Streaming bridge between a blocking generation loop and an async writer.
//!
//! The producer runs on Tokio's blocking pool and pushes text increments into
//! a bounded channel with `blocking_send`, so a slow reader stalls generation
//! instead of letting output pile up in memory. The consumer drains the
//! channel from async code. Completion and failure travel through the same
//! channel as tagged messages after the last increment, so the consumer sees
//! every increment produced before a failure, and sees the failure once.
//!
//! ```text
//! Idle --start--> Generating --increment--> Draining --+--> Done
//!                     |                       ^   |    |
//!                     |                       +---+    +--> Failed
//!                     +------------------------------------> Failed
//! ```
//!
//! Dropping the [`TranslationStream`] closes the channel; the producer's next
//! push then returns [`ControlFlow::Break`], which providers treat as a
//! request to stop. Providers that ignore it run to completion and their
//! remaining output is discarded.

use std::ops::ControlFlow;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::FinishReason;

/// Lifecycle of one request's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Channel exists, generation not started.
    Idle,
    /// Generation running, nothing delivered yet.
    Generating,
    /// At least one increment delivered.
    Draining,
    /// Completion received after all increments.
    Done,
    /// Generation failed, timed out, or stopped without completing.
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Done | StreamState::Failed)
    }
}

/// Sent by the producer when generation ends normally.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub tokens_generated: usize,
    pub finish_reason: FinishReason,
    pub generation_time_ms: f64,
}

enum StreamMessage {
    Increment(String),
    Done(GenerationSummary),
    Failed(Error),
}

/// Producer half, owned by the generation unit.
pub struct IncrementSink {
    tx: mpsc::Sender<StreamMessage>,
    pushed: usize,
    disconnected: bool,
}

impl IncrementSink {
    /// Hand one increment to the consumer, blocking while the channel is full.
    ///
    /// Returns `Break` once the consumer is gone. Empty increments are
    /// dropped. Must not be called from async context.
    pub fn push(&mut self, text: &str) -> ControlFlow<()> {
        if self.disconnected {
            return ControlFlow::Break(());
        }
        if text.is_empty() {
            return ControlFlow::Continue(());
        }

        match self.tx.blocking_send(StreamMessage::Increment(text.to_string())) {
            Ok(()) => {
                self.pushed += 1;
                ControlFlow::Continue(())
            }
            Err(_) => {
                self.disconnected = true;
                debug!(pushed = self.pushed, "stream consumer gone; stopping generation");
                ControlFlow::Break(())
            }
        }
    }

    /// Increments accepted by the channel so far.
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    fn finish(self, result: Result<GenerationSummary>) {
        let message = match result {
            Ok(summary) => StreamMessage::Done(summary),
            Err(err) => {
                warn!(pushed = self.pushed, "generation failed: {}", err);
                StreamMessage::Failed(err)
            }
        };
        if self.tx.blocking_send(message).is_err() {
            debug!("stream consumer gone before completion was signalled");
        }
    }
}

/// One request's bridge, before generation starts.
pub struct StreamingBridge {
    sink: IncrementSink,
    stream: TranslationStream,
}

impl StreamingBridge {
    /// Create the channel. `capacity` is the number of messages the producer
    /// may run ahead of the consumer; `timeout` bounds the whole generation.
    pub fn new(capacity: usize, timeout: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sink: IncrementSink {
                tx,
                pushed: 0,
                disconnected: false,
            },
            stream: TranslationStream {
                rx,
                state: StreamState::Idle,
                timeout,
                deadline: None,
                delivered: 0,
                summary: None,
            },
        }
    }

    pub fn state(&self) -> StreamState {
        self.stream.state
    }

    /// Run `generate` on the blocking pool and return the consumer half.
    ///
    /// Consumes the bridge: one bridge serves exactly one generation pass.
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(self, generate: F) -> TranslationStream
    where
        F: FnOnce(&mut IncrementSink) -> Result<GenerationSummary> + Send + 'static,
    {
        let Self {
            mut sink,
            mut stream,
        } = self;

        stream.state = StreamState::Generating;
        stream.deadline = stream.timeout.map(|timeout| Instant::now() + timeout);

        tokio::task::spawn_blocking(move || {
            let result = generate(&mut sink);
            sink.finish(result);
        });

        stream
    }
}

/// Consumer half: yields increments in production order.
pub struct TranslationStream {
    rx: mpsc::Receiver<StreamMessage>,
    state: StreamState,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    delivered: usize,
    summary: Option<GenerationSummary>,
}

impl TranslationStream {
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Increments handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Available once the stream reached [`StreamState::Done`].
    pub fn summary(&self) -> Option<&GenerationSummary> {
        self.summary.as_ref()
    }

    /// Wait for the next increment.
    ///
    /// `Some(Ok(_))` is an increment, `Some(Err(_))` the failure (returned
    /// once), `None` the end of the stream.
    pub async fn next_increment(&mut self) -> Option<Result<String>> {
        if self.state.is_terminal() {
            return None;
        }

        let message = match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(message) => message,
                Err(_) => return Some(Err(self.fail_on_timeout())),
            },
            None => self.rx.recv().await,
        };

        match message {
            Some(StreamMessage::Increment(text)) => {
                self.state = StreamState::Draining;
                self.delivered += 1;
                Some(Ok(text))
            }
            Some(StreamMessage::Done(summary)) => {
                debug!(
                    delivered = self.delivered,
                    tokens = summary.tokens_generated,
                    "translation stream completed"
                );
                self.state = StreamState::Done;
                self.summary = Some(summary);
                None
            }
            Some(StreamMessage::Failed(err)) => {
                self.state = StreamState::Failed;
                self.rx.close();
                Some(Err(err))
            }
            None => {
                self.state = StreamState::Failed;
                Some(Err(Error::InferenceError(
                    "Generation stopped without signalling completion".to_string(),
                )))
            }
        }
    }

    fn fail_on_timeout(&mut self) -> Error {
        let timeout = self.timeout.unwrap_or_default();
        warn!(
            delivered = self.delivered,
            "generation exceeded {:?}; abandoning it", timeout
        );
        self.state = StreamState::Failed;
        self.rx.close();
        Error::Timeout(timeout)
    }

    /// Drain the whole stream into one string.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(increment) = self.next_increment().await {
            text.push_str(&increment?);
        }
        Ok(text)
    }

    /// Adapt into a [`Stream`] of increments.
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next_increment().await?;
            Some((item, stream))
        })
    }
}

impl Drop for TranslationStream {
    fn drop(&mut self) {
        if matches!(self.state, StreamState::Generating | StreamState::Draining) {
            debug!(
                delivered = self.delivered,
                "translation stream dropped mid-generation; cancelling producer"
            );
        }
    }
}
