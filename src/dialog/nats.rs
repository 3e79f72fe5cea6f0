//! NATS JetStream transport for the dialog bridge
//!
//! Durable streams on both roots, a durable pull consumer filtered to this
//! gateway's source name, and explicit acks issued only after a message has
//! been fully handled — a crash mid-handling redelivers, so `say` and
//! `response` effects are at-least-once by design. Reconnects are handled by
//! the client; the session layer just sees a quiet bus until then.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_nats::jetstream::{self, consumer};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::dialog::{DialogHandler, DialogPayload, EventKind, PUB_ROOT, SUB_ROOT, parse_subject, subject};
use crate::{Error, Result};

/// How long the server waits for an ack before redelivering. Asks can hold a
/// message for a full spoken round-trip, so this is generous.
const ACK_WAIT: Duration = Duration::from_secs(300);

struct Started {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    consumer_task: JoinHandle<()>,
}

/// Dialog bridge over NATS JetStream
pub struct NatsDialog {
    url: String,
    source: String,
    state: Mutex<Option<Started>>,
}

impl NatsDialog {
    /// Create an unstarted bridge for `source`
    #[must_use]
    pub fn new(url: String, source: String) -> Self {
        Self { url, source, state: Mutex::new(None) }
    }

    /// Connect, declare streams, and start consuming `say`/`ask` events
    /// addressed to this source.
    ///
    /// # Errors
    ///
    /// Returns error if the connection or stream/consumer setup fails
    pub async fn start(&self, handler: Arc<dyn DialogHandler>) -> Result<()> {
        let client = async_nats::ConnectOptions::new()
            .name("vox-gateway")
            .retry_on_initial_connect()
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => {
                        tracing::warn!("bus disconnected, reconnecting");
                    }
                    async_nats::Event::Connected => tracing::info!("bus connected"),
                    other => tracing::debug!(event = ?other, "bus event"),
                }
            })
            .connect(&self.url)
            .await
            .map_err(|e| Error::Bus(format!("connect to {} failed: {e}", self.url)))?;

        let js = jetstream::new(client.clone());

        // Both roots are durable topic streams, declared idempotently.
        js.get_or_create_stream(jetstream::stream::Config {
            name: PUB_ROOT.to_string(),
            subjects: vec![format!("{PUB_ROOT}.>")],
            ..Default::default()
        })
        .await
        .map_err(|e| Error::Bus(format!("declare {PUB_ROOT} stream failed: {e}")))?;

        let sub_stream = js
            .get_or_create_stream(jetstream::stream::Config {
                name: SUB_ROOT.to_string(),
                subjects: vec![format!("{SUB_ROOT}.>")],
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Bus(format!("declare {SUB_ROOT} stream failed: {e}")))?;

        let durable = format!("{SUB_ROOT}-{}", self.source);
        let consumer = sub_stream
            .get_or_create_consumer(
                &durable,
                consumer::pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: format!("{SUB_ROOT}.*.{}", self.source),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Bus(format!("create consumer failed: {e}")))?;

        let consumer_task =
            tokio::spawn(consume_loop(consumer, js.clone(), self.source.clone(), handler));

        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(Started { client, jetstream: js, consumer_task });

        tracing::info!(url = %self.url, source = %self.source, "dialog bridge started");
        Ok(())
    }

    /// Publish a finalized wake utterance as an `input` event
    ///
    /// # Errors
    ///
    /// Returns error if the bridge is not started or the publish fails
    pub async fn publish_input(&self, text: &str) -> Result<()> {
        self.publish(EventKind::Input, text).await
    }

    async fn publish(&self, event: EventKind, text: &str) -> Result<()> {
        let js = {
            let guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.as_ref().map(|s| s.jetstream.clone())
        }
        .ok_or_else(|| {
            Error::Bus("bus not started: call start() before publishing".to_string())
        })?;

        publish_with(&js, &self.source, event, text).await
    }

    /// Stop consuming and flush outbound messages
    pub async fn close(&self) {
        let started = {
            let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.take()
        };

        if let Some(started) = started {
            // Unacked in-flight messages redeliver after ack_wait; that is
            // the at-least-once contract, not a leak.
            started.consumer_task.abort();
            if let Err(e) = started.client.flush().await {
                tracing::warn!(error = %e, "bus flush failed during close");
            }
            tracing::info!("bus connection closed");
        }
    }
}

async fn consume_loop(
    consumer: consumer::PullConsumer,
    js: jetstream::Context,
    source: String,
    handler: Arc<dyn DialogHandler>,
) {
    let mut messages = match consumer.messages().await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::error!(error = %e, "bus consumer failed to start");
            return;
        }
    };

    tracing::info!("listening on bus");

    while let Some(next) = messages.next().await {
        match next {
            Ok(message) => {
                handle_message(&js, &source, handler.as_ref(), &message).await;
                if let Err(e) = message.ack().await {
                    tracing::warn!(error = %e, "ack failed, message may redeliver");
                }
            }
            Err(e) => {
                // Transient consume errors (missed heartbeats during a
                // reconnect) resolve on their own.
                tracing::warn!(error = %e, "bus consume error");
            }
        }
    }

    tracing::info!("bus consumer stopped");
}

async fn handle_message(
    js: &jetstream::Context,
    source: &str,
    handler: &dyn DialogHandler,
    message: &jetstream::Message,
) {
    let Some(event) = parse_subject(&message.subject) else {
        tracing::warn!(subject = %message.subject, "unroutable subject");
        return;
    };

    let payload: DialogPayload = match serde_json::from_slice(&message.payload) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, subject = %message.subject, "bad payload");
            return;
        }
    };

    tracing::debug!(event = ?event, text = %payload.text, "bus message");

    match event {
        EventKind::Say => {
            if let Err(e) = handler.handle_say(&payload.text).await {
                tracing::warn!(error = %e, "say failed");
            }
        }
        EventKind::Ask => match handler.handle_ask(&payload.text).await {
            Ok(answer) => {
                if let Err(e) = publish_with(js, source, EventKind::Response, &answer).await {
                    tracing::error!(error = %e, "response publish failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "ask abandoned, no response published"),
        },
        EventKind::Input | EventKind::Response => {
            tracing::debug!(event = ?event, "ignoring event not meant for the front-end");
        }
    }
}

async fn publish_with(
    js: &jetstream::Context,
    source: &str,
    event: EventKind,
    text: &str,
) -> Result<()> {
    let payload = serde_json::to_vec(&DialogPayload { session_id: 0, text: text.to_string() })?;
    let subject = subject(PUB_ROOT, event, source);

    js.publish(subject, payload.into())
        .await
        .map_err(|e| Error::Bus(e.to_string()))?
        .await
        .map_err(|e| Error::Bus(e.to_string()))?;

    tracing::debug!(event = ?event, "published");
    Ok(())
}
