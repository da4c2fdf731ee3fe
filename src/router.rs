//! Event router: one active flow per user, dispatched through an ordered
//! pipeline of stages (commands, role choices, the active flow, fallback).
//!
//! Each user's events are serialized behind a per-user lock; the map lock
//! is only held to look the slot up, so one user's long-running broadcast
//! never blocks another user's conversation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::flows::keyboards::role_menu;
use crate::flows::{Event, Flow, FlowContext, FlowKind, Reply};

const MSG_WELCOME: &str = "مرحبًا! 👋\nمن فضلك اختر صفتك للمتابعة:";
const MSG_HINT: &str = "ℹ️ اضغط /start للبدء.";
const MSG_UNEXPECTED_ERROR: &str = "❌ حدث خطأ غير متوقع. حاول مجددًا لاحقًا.";

type FlowSlot = Arc<Mutex<Option<Flow>>>;

/// Whether a dispatch stage consumed the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Handled,
    Next,
}

impl StageOutcome {
    fn handled(self) -> bool {
        self == Self::Handled
    }
}

/// Routes inbound events to per-user conversation flows.
pub struct Router {
    ctx: FlowContext,
    flows: Mutex<HashMap<String, FlowSlot>>,
}

impl Router {
    pub fn new(ctx: FlowContext) -> Self {
        Self {
            ctx,
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Shared capabilities this router dispatches with.
    pub fn ctx(&self) -> &FlowContext {
        &self.ctx
    }

    /// Handle one inbound event for one user.
    ///
    /// This is the error boundary: a storage or delivery failure inside a
    /// flow is logged, the conversation is dropped, and the user gets a
    /// generic apology instead of a stuck flow.
    pub async fn dispatch(&self, user_id: &str, event: Event) {
        let slot = self.slot_for(user_id).await;
        {
            let mut active = slot.lock().await;

            if let Err(e) = self.process(user_id, &event, &mut active).await {
                let stage = active
                    .as_ref()
                    .map(Flow::stage_label)
                    .unwrap_or_else(|| "none".to_string());
                error!(user = user_id, stage = %stage, error = %e, "Dispatch failed");
                *active = None;
                self.send_replies(user_id, &[Reply::text(MSG_UNEXPECTED_ERROR)])
                    .await;
            }
        }
        self.evict_if_idle(user_id, &slot).await;
    }

    async fn slot_for(&self, user_id: &str) -> FlowSlot {
        let mut flows = self.flows.lock().await;
        Arc::clone(flows.entry(user_id.to_string()).or_default())
    }

    /// Drop the user's map entry when no flow remains, so the map tracks
    /// only users mid-conversation instead of everyone ever seen.
    ///
    /// A slot still referenced by a concurrent dispatch for the same user
    /// is left alone; that dispatch runs its own eviction afterwards.
    async fn evict_if_idle(&self, user_id: &str, slot: &FlowSlot) {
        let mut flows = self.flows.lock().await;
        let idle = match flows.get(user_id) {
            // Two strong refs: the map's and ours. The map lock keeps new
            // dispatches from grabbing the slot while we decide.
            Some(current) if Arc::ptr_eq(current, slot) => {
                Arc::strong_count(current) == 2
                    && current.try_lock().map(|flow| flow.is_none()).unwrap_or(false)
            }
            _ => false,
        };
        if idle {
            flows.remove(user_id);
        }
    }

    /// Ordered stage pipeline: the first stage that handles the event
    /// short-circuits the rest.
    async fn process(
        &self,
        user_id: &str,
        event: &Event,
        active: &mut Option<Flow>,
    ) -> Result<(), crate::error::Error> {
        if self.stage_command(user_id, event, active).await?.handled() {
            return Ok(());
        }
        if self.stage_role_choice(user_id, event, active).await?.handled() {
            return Ok(());
        }
        if self.stage_active_flow(user_id, event, active).await?.handled() {
            return Ok(());
        }
        self.stage_fallback(user_id, event).await
    }

    /// Commands abandon whatever conversation was in progress.
    async fn stage_command(
        &self,
        user_id: &str,
        event: &Event,
        active: &mut Option<Flow>,
    ) -> Result<StageOutcome, crate::error::Error> {
        let Event::Text(text) = event else {
            return Ok(StageOutcome::Next);
        };
        match text.trim() {
            "/start" => {
                *active = None;
                self.send_replies(
                    user_id,
                    &[Reply::with_keyboard(
                        MSG_WELCOME,
                        role_menu(self.ctx.config.is_admin(user_id)),
                    )],
                )
                .await;
                Ok(StageOutcome::Handled)
            }
            "/admin" => {
                *active = None;
                self.enter(user_id, FlowKind::Broadcast, active).await?;
                Ok(StageOutcome::Handled)
            }
            _ => Ok(StageOutcome::Next),
        }
    }

    /// Role buttons start a fresh flow even mid-conversation.
    async fn stage_role_choice(
        &self,
        user_id: &str,
        event: &Event,
        active: &mut Option<Flow>,
    ) -> Result<StageOutcome, crate::error::Error> {
        let Event::Choice(data) = event else {
            return Ok(StageOutcome::Next);
        };
        let kind = match data.as_str() {
            "role:student" => FlowKind::Student,
            "role:parent" => FlowKind::Parent,
            "role:admin" => FlowKind::Broadcast,
            _ => return Ok(StageOutcome::Next),
        };
        *active = None;
        self.enter(user_id, kind, active).await?;
        Ok(StageOutcome::Handled)
    }

    /// Feed the event to the user's active conversation, if any.
    async fn stage_active_flow(
        &self,
        user_id: &str,
        event: &Event,
        active: &mut Option<Flow>,
    ) -> Result<StageOutcome, crate::error::Error> {
        let Some(flow) = active.as_mut() else {
            return Ok(StageOutcome::Next);
        };
        let step = flow.handle(&self.ctx, user_id, event).await?;
        self.send_replies(user_id, step.replies()).await;
        if step.is_leave() {
            info!(user = user_id, stage = %flow.stage_label(), "Flow finished");
            *active = None;
        }
        Ok(StageOutcome::Handled)
    }

    /// No flow, no command: nudge towards /start. Stray button presses
    /// from stale keyboards are dropped silently.
    async fn stage_fallback(
        &self,
        user_id: &str,
        event: &Event,
    ) -> Result<(), crate::error::Error> {
        if matches!(event, Event::Text(_)) {
            self.send_replies(user_id, &[Reply::text(MSG_HINT)]).await;
        }
        Ok(())
    }

    async fn enter(
        &self,
        user_id: &str,
        kind: FlowKind,
        active: &mut Option<Flow>,
    ) -> Result<(), crate::error::Error> {
        let (flow, replies) = Flow::enter(kind, &self.ctx, user_id);
        *active = flow;
        self.send_replies(user_id, &replies).await;
        Ok(())
    }

    /// Deliver a flow's replies. Delivery failures are logged and swallowed;
    /// failing the dispatch over an undeliverable reply would only drop the
    /// user's conversation on top of the lost message.
    async fn send_replies(&self, user_id: &str, replies: &[Reply]) {
        for reply in replies {
            let sent = if reply.formatted {
                self.ctx
                    .messenger
                    .send_formatted(user_id, &reply.text, reply.keyboard.as_ref())
                    .await
            } else {
                match &reply.keyboard {
                    Some(kb) => {
                        self.ctx
                            .messenger
                            .send_with_keyboard(user_id, &reply.text, kb)
                            .await
                    }
                    None => self.ctx.messenger.send(user_id, &reply.text).await,
                }
            };
            if let Err(e) = sent {
                warn!(user = user_id, error = %e, "Reply delivery failed");
            }
        }
    }

    #[cfg(test)]
    async fn tracked_slots(&self) -> usize {
        self.flows.lock().await.len()
    }
}
