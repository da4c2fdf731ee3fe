//! Admin broadcast conversation: pick an audience, draft a message,
//! confirm, then deliver sequentially under the channel's rate limit.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::BroadcastConfig;
use crate::flows::keyboards::{admin_panel_keyboard, broadcast_years_keyboard, confirm_keyboard};
use crate::flows::{Event, FlowContext, Reply, Step};
use crate::messenger::Messenger;
use crate::model::YEARS;
use crate::validation::{escape_markdown, sanitize_text};

pub(crate) const MSG_ACCESS_DENIED: &str = "⛔ ليس لديك صلاحية الوصول إلى لوحة الإدارة.";
const MSG_PANEL: &str = "⚙️ لوحة المدير\n\nاختر نوع البث:";
const MSG_ASK_TEXT_STUDENTS: &str = "📝 أرسل نص الرسالة للبث إلى جميع الطلاب:";
const MSG_ASK_TEXT_PARENTS: &str = "📝 أرسل نص الرسالة للبث إلى جميع أولياء الأمور:";
const MSG_PICK_YEAR: &str = "🎓 اختر السنة الدراسية:";
pub(crate) const MSG_CANCELLED: &str = "❌ تم الإلغاء";
pub(crate) const MSG_NO_RECIPIENTS: &str = "ℹ️ لا يوجد مستلمون لهذا البث حالياً.";
const MSG_USE_BUTTONS_FIRST: &str = "⚠️ استخدم الأزرار لاختيار الفئة أولاً، ثم أرسل النص.";
const MSG_SEND_TEXT_FIRST: &str = "⚠️ أرسل نص الرسالة أولاً.";
const MSG_NOTHING_TO_CONFIRM: &str = "⚠️ لا توجد رسالة مؤكدة للإرسال.";

/// Upper bound for a draft; Telegram rejects longer messages anyway.
const MAX_DRAFT_LEN: usize = 4096;

/// The resolved broadcast audience selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Students,
    Parents,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Target,
    Year,
    Text,
    Confirm,
}

/// Success/failure counters for one delivery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-admin broadcast state machine.
pub struct BroadcastFlow {
    stage: Stage,
    target: Option<Target>,
    year: Option<String>,
    draft: Option<String>,
}

impl BroadcastFlow {
    /// Open the admin panel. Returns `None` for non-admins.
    pub fn enter(ctx: &FlowContext, user_id: &str) -> Option<(Self, Reply)> {
        if !ctx.config.is_admin(user_id) {
            warn!(user = user_id, "Broadcast panel refused for non-admin");
            return None;
        }
        Some((
            Self {
                stage: Stage::Target,
                target: None,
                year: None,
                draft: None,
            },
            Reply::with_keyboard(MSG_PANEL, admin_panel_keyboard()),
        ))
    }

    pub(crate) fn stage_name(&self) -> &'static str {
        match self.stage {
            Stage::Target => "target",
            Stage::Year => "year",
            Stage::Text => "text",
            Stage::Confirm => "confirm",
        }
    }

    pub async fn handle(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
        event: &Event,
    ) -> Result<Step, crate::error::Error> {
        match event {
            // Cancel discards everything with no side effects.
            Event::Choice(data) if data == "adm:cancel" => {
                Ok(Step::leave(Reply::text(MSG_CANCELLED)))
            }
            Event::Choice(data) => self.on_choice(ctx, user_id, data).await,
            Event::Text(text) => Ok(self.on_text(text)),
        }
    }

    async fn on_choice(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
        data: &str,
    ) -> Result<Step, crate::error::Error> {
        match (self.stage, data) {
            (Stage::Target, "adm:students") => {
                self.target = Some(Target::Students);
                self.stage = Stage::Text;
                Ok(Step::stay(Reply::text(MSG_ASK_TEXT_STUDENTS)))
            }
            (Stage::Target, "adm:parents") => {
                self.target = Some(Target::Parents);
                self.stage = Stage::Text;
                Ok(Step::stay(Reply::text(MSG_ASK_TEXT_PARENTS)))
            }
            (Stage::Target, "adm:year") => {
                self.target = Some(Target::Year);
                self.stage = Stage::Year;
                Ok(Step::stay(Reply::with_keyboard(
                    MSG_PICK_YEAR,
                    broadcast_years_keyboard(),
                )))
            }
            (Stage::Year, _) if data.starts_with("year:") => {
                let year = data.trim_start_matches("year:");
                if !YEARS.contains(&year) {
                    return Ok(Step::stay_silent());
                }
                self.year = Some(year.to_string());
                self.stage = Stage::Text;
                Ok(Step::stay(Reply::text(format!(
                    "📝 السنة المختارة: {year}\n\nأرسل نص الرسالة:"
                ))))
            }
            (Stage::Confirm, "bc:confirm") => self.on_confirm(ctx, user_id).await,
            (Stage::Text, _) => Ok(Step::stay(Reply::text(MSG_SEND_TEXT_FIRST))),
            // A stray confirm without a prepared draft, or an unknown button.
            (_, "bc:confirm") => Ok(Step::stay(Reply::text(MSG_NOTHING_TO_CONFIRM))),
            _ => Ok(Step::stay_silent()),
        }
    }

    /// First free-text message becomes the draft; show the preview.
    fn on_text(&mut self, text: &str) -> Step {
        if self.stage != Stage::Text || self.target.is_none() {
            return Step::stay(Reply::text(MSG_USE_BUTTONS_FIRST));
        }

        let draft = escape_markdown(&sanitize_text(text, MAX_DRAFT_LEN));
        let label = self.audience_label();
        self.draft = Some(draft.clone());
        self.stage = Stage::Confirm;

        // The draft is escaped, so the preview must render in the same
        // strict mode as the delivery or the escapes show up literally.
        Step::stay(Reply::formatted_with_keyboard(
            format!("📋 المعاينة:\n\n{draft}\n\n📤 سيتم الإرسال إلى: {label}\n\nهل تريد المتابعة؟"),
            confirm_keyboard(),
        ))
    }

    async fn on_confirm(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
    ) -> Result<Step, crate::error::Error> {
        let (Some(target), Some(draft)) = (self.target, self.draft.clone()) else {
            return Ok(Step::stay(Reply::text(MSG_NOTHING_TO_CONFIRM)));
        };

        let recipients = self.resolve_recipients(ctx, target).await?;
        if recipients.is_empty() {
            return Ok(Step::leave(Reply::text(MSG_NO_RECIPIENTS)));
        }

        // Progress note before the long-running loop.
        let _ = ctx
            .messenger
            .send(
                user_id,
                &format!("🚀 جاري الإرسال إلى {} مستلم...", recipients.len()),
            )
            .await;

        let tally = deliver(
            ctx.messenger.as_ref(),
            &recipients,
            &draft,
            &ctx.config.broadcast,
        )
        .await;

        info!(
            admin = user_id,
            target = self.stage_target_label(target),
            year = self.year.as_deref().unwrap_or(""),
            attempted = tally.attempted,
            succeeded = tally.succeeded,
            failed = tally.failed,
            "Broadcast completed"
        );

        Ok(Step::leave(Reply::text(format!(
            "✅ اكتمل البث\n\nالإجمالي: {}\nنجح: {}\nفشل: {}",
            tally.attempted, tally.succeeded, tally.failed
        ))))
    }

    /// Distinct non-empty recipient identifiers for the chosen audience.
    async fn resolve_recipients(
        &self,
        ctx: &FlowContext,
        target: Target,
    ) -> Result<Vec<String>, crate::error::StoreError> {
        let ids: Vec<String> = match target {
            Target::Students => ctx
                .records
                .list_students()
                .await?
                .iter()
                .map(|s| s.telegram_id.clone())
                .collect(),
            Target::Parents => ctx
                .records
                .list_parents()
                .await?
                .iter()
                .map(|p| p.telegram_id.clone())
                .collect(),
            Target::Year => {
                let Some(year) = self.year.as_deref() else {
                    return Ok(Vec::new());
                };
                ctx.records
                    .list_students()
                    .await?
                    .iter()
                    .filter(|s| s.year == year)
                    .map(|s| s.telegram_id.clone())
                    .collect()
            }
        };
        Ok(dedupe_non_empty(ids))
    }

    fn audience_label(&self) -> String {
        match self.target {
            Some(Target::Students) => "جميع الطلاب".to_string(),
            Some(Target::Parents) => "جميع أولياء الأمور".to_string(),
            Some(Target::Year) => format!(
                "سنة: {}",
                self.year.as_deref().unwrap_or("غير محددة")
            ),
            None => String::new(),
        }
    }

    fn stage_target_label(&self, target: Target) -> &'static str {
        match target {
            Target::Students => "students",
            Target::Parents => "parents",
            Target::Year => "year",
        }
    }
}

/// Drop empty identifiers and duplicates, keeping first-seen order.
fn dedupe_non_empty(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

/// Sequential throttled delivery over an already-deduplicated list.
///
/// One recipient's failure never aborts the loop. A rate-limited send
/// counts as failed and triggers the penalty delay instead of the base
/// delay; the message is not retried in this pass.
pub(crate) async fn deliver(
    messenger: &dyn Messenger,
    recipients: &[String],
    text: &str,
    config: &BroadcastConfig,
) -> Tally {
    let mut tally = Tally {
        attempted: recipients.len(),
        ..Default::default()
    };

    for recipient in recipients {
        match messenger.send_formatted(recipient, text, None).await {
            Ok(()) => {
                tally.succeeded += 1;
                tokio::time::sleep(config.base_delay).await;
            }
            Err(e) => {
                tally.failed += 1;
                warn!(recipient = %recipient, error = %e, "Broadcast send failed");
                if e.is_rate_limited() {
                    tokio::time::sleep(config.penalty_delay).await;
                }
            }
        }
    }

    tally
}
