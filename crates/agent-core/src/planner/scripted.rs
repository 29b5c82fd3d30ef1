//! Offline tool transport that replays queued replies.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pilot_core_types::ViewportSize;

use super::conversation::{ContentBlock, PlannerMessage};
use super::tool_calling::{PlannerReply, ToolCall, ToolTransport};
use crate::errors::AgentError;

/// A request as the scripted transport received it.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<PlannerMessage>,
    pub display: ViewportSize,
}

/// Returns queued replies in order and records every request. Running out of
/// replies is a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<PlannerReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = PlannerReply>) -> Self {
        let transport = Self::new();
        for reply in replies {
            transport.push(reply);
        }
        transport
    }

    pub fn push(&self, reply: PlannerReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Queues a reply made of `content` without usage data.
    pub fn push_content(&self, content: Vec<ContentBlock>) {
        self.push(PlannerReply {
            content,
            usage: None,
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

/// The queues stay consistent across a panicking holder, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ToolTransport for ScriptedTransport {
    async fn complete(&self, call: ToolCall<'_>) -> Result<PlannerReply, AgentError> {
        lock(&self.calls).push(RecordedCall {
            system: call.system.to_string(),
            messages: call.messages.to_vec(),
            display: call.display,
        });
        lock(&self.replies)
            .pop_front()
            .ok_or_else(|| AgentError::planner("scripted transport has no replies left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn poison(transport: &ScriptedTransport) {
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = transport.replies.lock();
            panic!("holder panicked");
        }));
        assert!(transport.replies.is_poisoned());
    }

    #[tokio::test]
    async fn poisoned_queue_still_accepts_and_serves_replies() {
        let transport = ScriptedTransport::new();
        poison(&transport);

        transport.push_content(vec![ContentBlock::text("queued after the panic")]);
        assert_eq!(transport.remaining(), 1);

        let reply = transport
            .complete(ToolCall {
                system: "system",
                messages: &[],
                display: ViewportSize::new(1280, 800),
            })
            .await
            .unwrap();
        assert_eq!(reply.content, vec![ContentBlock::text("queued after the panic")]);
        assert_eq!(transport.remaining(), 0);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_is_a_transport_error() {
        let transport = ScriptedTransport::new();
        let err = transport
            .complete(ToolCall {
                system: "system",
                messages: &[],
                display: ViewportSize::new(1280, 800),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::PlannerTransport(_)));
    }
}
