//! Planner backed by a tool-calling vision service.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use perceiver_visual::ScreenshotAnnotator;
use pilot_core_types::{Action, ViewportSize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::conversation::{redact_images, ContentBlock, HistorySerializer, PlannerMessage, SerializerSettings};
use super::normalizer::ActionNormalizer;
use super::prompt::system_prompt;
use super::{ActionPlanner, PlanRequest};
use crate::agent_loop::AgentConfig;
use crate::errors::AgentError;
use crate::ids::{CorrelationIdSource, UuidIdSource};
use crate::scaling::Scaling;

/// One request to the service.
#[derive(Debug, Clone, Copy)]
pub struct ToolCall<'a> {
    pub system: &'a str,
    pub messages: &'a [PlannerMessage],
    /// Screenshot size the planner sees; advertised as the display size.
    pub display: ViewportSize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlannerReply {
    pub content: Vec<ContentBlock>,
    pub usage: Option<TokenUsage>,
}

/// Wire access to a tool-calling service.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn complete(&self, call: ToolCall<'_>) -> Result<PlannerReply, AgentError>;
}

/// Writes the last screenshot in `messages` to `path`, if one is configured.
pub(crate) async fn dump_last_image(path: Option<&Path>, messages: &[PlannerMessage]) {
    let Some(path) = path else {
        return;
    };
    let Some(image) = messages.iter().flat_map(|m| m.images()).last() else {
        return;
    };
    match STANDARD.decode(&image.data) {
        Ok(bytes) => {
            if let Err(err) = tokio::fs::write(path, bytes).await {
                warn!(path = %path.display(), ?err, "failed to write debug screenshot");
            }
        }
        Err(err) => warn!(?err, "debug screenshot is not valid base64"),
    }
}

pub struct ToolCallingPlanner<T> {
    transport: T,
    settings: SerializerSettings,
    normalizer: ActionNormalizer,
    ids: Arc<dyn CorrelationIdSource>,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl<T: ToolTransport> ToolCallingPlanner<T> {
    pub fn new(transport: T, config: &AgentConfig) -> Self {
        Self {
            transport,
            settings: SerializerSettings {
                retention: config.screenshot_retention,
                canvas: config.canvas,
                annotator: ScreenshotAnnotator::default(),
            },
            normalizer: ActionNormalizer::new(config.jitter_tolerance_px),
            ids: Arc::new(UuidIdSource),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// Replace the correlation id source.
    pub fn with_ids(mut self, ids: Arc<dyn CorrelationIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_annotator(mut self, annotator: ScreenshotAnnotator) -> Self {
        self.settings.annotator = annotator;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Tokens consumed by this planner so far.
    pub fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }

    fn record_usage(&self, usage: TokenUsage) {
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::Relaxed);
        let total = self.token_usage();
        info!(
            input = usage.input_tokens,
            output = usage.output_tokens,
            "planner token usage"
        );
        info!(
            input = total.input_tokens,
            output = total.output_tokens,
            total = total.total(),
            "cumulative planner token usage"
        );
    }
}

#[async_trait]
impl<T: ToolTransport> ActionPlanner for ToolCallingPlanner<T> {
    async fn plan_action(&self, request: PlanRequest<'_>) -> Result<Action, AgentError> {
        let scaling = Scaling::fit(request.state.viewport, self.settings.canvas);
        let system = system_prompt(request.instructions, &chrono::Local::now());

        let messages = HistorySerializer::new(
            request.goal,
            request.context,
            request.state,
            request.history,
            &self.settings,
            self.ids.next_id(),
        )
        .collect::<Result<Vec<_>, _>>()?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let redacted = serde_json::to_string(&redact_images(&messages)).unwrap_or_default();
            debug!(messages = messages.len(), conversation = %redacted, "planner request");
        }

        let reply = self
            .transport
            .complete(ToolCall {
                system: &system,
                messages: &messages,
                display: scaling.planner_size(),
            })
            .await?;
        if let Some(usage) = reply.usage {
            self.record_usage(usage);
        }

        let action =
            self.normalizer
                .normalize(&reply.content, &scaling, request.state, self.ids.as_ref());
        info!(
            action = %action.kind,
            id = %action.id,
            reasoning = %action.reasoning,
            "planner decided"
        );
        Ok(action)
    }
}
