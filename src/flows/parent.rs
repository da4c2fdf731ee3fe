//! Parent registration conversation.
//!
//! Name → Phone (duplicate guard) → Child reference (phone or student ID).
//! The record is written regardless of whether the reference resolves:
//! resolved children produce a `Linked` record holding the child's phone,
//! everything else an `Unlinked` record holding the raw reference verbatim.

use chrono::Utc;
use tracing::{info, warn};

use crate::flows::student::{MSG_ALREADY_REGISTERED, MSG_BAD_PHONE, MSG_NAME_TOO_SHORT, MSG_SAVE_FAILED};
use crate::flows::{Event, FlowContext, Reply, Step};
use crate::model::{LinkStatus, Parent, RecordKind, Student, generate_record_id};
use crate::validation::{sanitize_text, validate_parent, validate_phone};

const MSG_ASK_NAME: &str = "📝 ما اسمك الكامل؟";
const MSG_ASK_PHONE: &str = "📱 ما رقم هاتفك الشخصي؟\nمثال: 0555123456";
const MSG_ASK_CHILD: &str = "👦 أدخل رقم هاتف ابنك أو الرقم التعريفي الخاص به:\n\n\
    • رقم الهاتف: مثال 0555123456\n\
    • أو الرقم التعريفي: مثال STU-1234567890-123456";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Name,
    Phone,
    ChildRef,
}

#[derive(Debug, Default)]
struct Draft {
    name: Option<String>,
    phone: Option<String>,
}

/// Per-user parent registration state machine.
pub struct ParentFlow {
    stage: Stage,
    draft: Draft,
}

impl ParentFlow {
    pub fn enter() -> (Self, Reply) {
        (
            Self {
                stage: Stage::Name,
                draft: Draft::default(),
            },
            Reply::text(MSG_ASK_NAME),
        )
    }

    pub(crate) fn stage_name(&self) -> &'static str {
        match self.stage {
            Stage::Name => "name",
            Stage::Phone => "phone",
            Stage::ChildRef => "child_ref",
        }
    }

    pub async fn handle(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
        event: &Event,
    ) -> Result<Step, crate::error::Error> {
        match (self.stage, event) {
            (Stage::Name, Event::Text(text)) => Ok(self.on_name(text)),
            (Stage::Phone, Event::Text(text)) => self.on_phone(ctx, text).await,
            (Stage::ChildRef, Event::Text(text)) => self.on_child_ref(ctx, user_id, text).await,
            // This flow has no buttons; stray presses are ignored.
            (_, Event::Choice(_)) => Ok(Step::stay_silent()),
        }
    }

    fn on_name(&mut self, text: &str) -> Step {
        let name = sanitize_text(text, 100);
        if name.chars().count() < 3 {
            return Step::stay(Reply::text(MSG_NAME_TOO_SHORT));
        }
        self.draft.name = Some(name);
        self.stage = Stage::Phone;
        Step::stay(Reply::text(MSG_ASK_PHONE))
    }

    async fn on_phone(&mut self, ctx: &FlowContext, text: &str) -> Result<Step, crate::error::Error> {
        let phone = match validate_phone(text) {
            Ok(phone) => phone,
            Err(_) => return Ok(Step::stay(Reply::text(MSG_BAD_PHONE))),
        };

        if ctx.records.find_parent_by_phone(&phone).await?.is_some() {
            return Ok(Step::leave(Reply::text(MSG_ALREADY_REGISTERED)));
        }

        self.draft.phone = Some(phone);
        self.stage = Stage::ChildRef;
        Ok(Step::stay(Reply::text(MSG_ASK_CHILD)))
    }

    /// Resolve the child reference and write the record either way.
    async fn on_child_ref(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
        text: &str,
    ) -> Result<Step, crate::error::Error> {
        let raw = text.trim().to_string();

        let child: Option<Student> = if let Ok(phone) = validate_phone(&raw) {
            ctx.records.find_student_by_phone(&phone).await?
        } else if raw.starts_with("STU-") {
            ctx.records.find_student_by_id(&raw).await?
        } else {
            None
        };

        let parent_id = generate_record_id(RecordKind::Parent);
        let parent = Parent {
            name: self.draft.name.clone().unwrap_or_default(),
            phone: self.draft.phone.clone().unwrap_or_default(),
            child_ref: child
                .as_ref()
                .map(|c| c.phone.clone())
                .unwrap_or_else(|| raw.clone()),
            link_status: if child.is_some() {
                LinkStatus::Linked
            } else {
                LinkStatus::Unlinked
            },
            telegram_id: user_id.to_string(),
            parent_id: parent_id.clone(),
            registered_at: Utc::now(),
        };

        if let Err(e) = validate_parent(&parent) {
            warn!(user = user_id, error = %e, "Parent draft failed validation");
            return Ok(Step::leave(Reply::text(MSG_SAVE_FAILED)));
        }

        ctx.records.add_parent(&parent).await?;

        match child {
            Some(child) => {
                info!(user = user_id, parent_id = %parent_id, child = %child.name,
                    "Parent linked successfully");
                Ok(Step::leave(Reply::text(format!(
                    "✅ تم ربط حسابك بابنك بنجاح!\n\n👦 الاسم: {}\n📚 السنة: {}\n🆔 رقمك التعريفي: `{}`\n\n🔔 سيصلك إشعار بأي تحديثات خاصة بابنك.",
                    child.name, child.year, parent_id
                ))))
            }
            None => {
                warn!(user = user_id, parent_id = %parent_id, child_ref = %raw,
                    "Parent registered but child not found");
                Ok(Step::leave(Reply::text(format!(
                    "⚠️ الرقم غير موجود في النظام.\n\nيرجى التوجه إلى المؤسسة لتسجيل ابنك أولاً.\n\n🆔 رقمك التعريفي: `{}`",
                    parent_id
                ))))
            }
        }
    }
}
