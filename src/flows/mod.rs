//! Per-user conversation flows.
//!
//! A `Flow` is the closed set of conversation kinds; the router keeps one
//! active flow per user and feeds it inbound events. Flows own their
//! conversation state exclusively and drop it when they leave.

pub mod broadcast;
pub mod keyboards;
pub mod parent;
pub mod student;

use std::sync::Arc;

pub use broadcast::BroadcastFlow;
pub use parent::ParentFlow;
pub use student::StudentFlow;

use crate::config::BotConfig;
use crate::error::Error;
use crate::messenger::{InlineKeyboard, Messenger};
use crate::records::RecordStore;

/// An inbound event for a conversation: free text or a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(String),
    Choice(String),
}

/// One outgoing message produced by a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
    /// Text already escaped with [`crate::validation::escape_markdown`];
    /// delivered through the messenger's strict-markup path.
    pub formatted: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            formatted: false,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
            formatted: false,
        }
    }

    /// A reply whose text was escaped for strict markup rendering.
    pub fn formatted_with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
            formatted: true,
        }
    }
}

/// Outcome of handling one event: replies to send, then either stay in the
/// conversation or leave it.
#[derive(Debug)]
pub enum Step {
    Continue(Vec<Reply>),
    Leave(Vec<Reply>),
}

impl Step {
    pub fn stay(reply: Reply) -> Self {
        Self::Continue(vec![reply])
    }

    /// Stay without replying (ignored event).
    pub fn stay_silent() -> Self {
        Self::Continue(Vec::new())
    }

    pub fn leave(reply: Reply) -> Self {
        Self::Leave(vec![reply])
    }

    pub fn replies(&self) -> &[Reply] {
        match self {
            Self::Continue(replies) | Self::Leave(replies) => replies,
        }
    }

    pub fn is_leave(&self) -> bool {
        matches!(self, Self::Leave(_))
    }
}

/// Shared capabilities every flow may use.
pub struct FlowContext {
    pub records: Arc<RecordStore>,
    pub messenger: Arc<dyn Messenger>,
    pub config: Arc<BotConfig>,
}

/// Which flow to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Student,
    Parent,
    Broadcast,
}

/// The closed set of active conversation kinds.
pub enum Flow {
    Student(StudentFlow),
    Parent(ParentFlow),
    Broadcast(BroadcastFlow),
}

impl Flow {
    /// Start a flow for a user. Returns `None` (plus any replies) when
    /// entry is refused, e.g. a non-admin opening the broadcast panel.
    pub fn enter(kind: FlowKind, ctx: &FlowContext, user_id: &str) -> (Option<Flow>, Vec<Reply>) {
        match kind {
            FlowKind::Student => {
                let (flow, reply) = StudentFlow::enter();
                (Some(Flow::Student(flow)), vec![reply])
            }
            FlowKind::Parent => {
                let (flow, reply) = ParentFlow::enter();
                (Some(Flow::Parent(flow)), vec![reply])
            }
            FlowKind::Broadcast => match BroadcastFlow::enter(ctx, user_id) {
                Some((flow, reply)) => (Some(Flow::Broadcast(flow)), vec![reply]),
                None => (None, vec![Reply::text(broadcast::MSG_ACCESS_DENIED)]),
            },
        }
    }

    /// Process one inbound event for this user's conversation.
    pub async fn handle(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
        event: &Event,
    ) -> Result<Step, Error> {
        match self {
            Flow::Student(flow) => flow.handle(ctx, user_id, event).await,
            Flow::Parent(flow) => flow.handle(ctx, user_id, event).await,
            Flow::Broadcast(flow) => flow.handle(ctx, user_id, event).await,
        }
    }

    /// Flow and stage label, used for error-boundary logging.
    pub fn stage_label(&self) -> String {
        match self {
            Flow::Student(flow) => format!("student/{}", flow.stage_name()),
            Flow::Parent(flow) => format!("parent/{}", flow.stage_name()),
            Flow::Broadcast(flow) => format!("broadcast/{}", flow.stage_name()),
        }
    }
}
