//! Student registration conversation.
//!
//! Name → Phone (duplicate guard) → Year (single-select) → Subjects →
//! Teachers (multi-select) → persist.

use chrono::Utc;
use tracing::{info, warn};

use crate::flows::keyboards::{subjects_keyboard, teachers_keyboard, years_keyboard};
use crate::flows::{Event, FlowContext, Reply, Step};
use crate::model::{RecordKind, SUBJECTS, Student, TEACHERS, YEARS, generate_record_id};
use crate::validation::{sanitize_text, validate_phone, validate_student};

pub(crate) const MSG_ASK_NAME: &str = "📝 ما اسمك الكامل؟";
pub(crate) const MSG_NAME_TOO_SHORT: &str =
    "⚠️ الاسم قصير جدًا. أدخل اسمك الكامل (3 أحرف على الأقل).";
const MSG_ASK_PHONE: &str = "📱 ما رقم هاتفك؟\nمثال: 0555123456 أو 0666123456";
pub(crate) const MSG_BAD_PHONE: &str =
    "❌ رقم غير صالح.\n\nأدخل رقم هاتف جزائري صحيح:\n• يبدأ بـ 05، 06، أو 07\n• مثال: 0555123456";
pub(crate) const MSG_ALREADY_REGISTERED: &str = "✅ أنت مسجّل مسبقًا في النظام.\n\nلن نكرر البيانات.";
const MSG_ASK_YEAR: &str = "🎓 في أي سنة تدرس؟";
const MSG_PICK_YEAR_FIRST: &str = "⚠️ اختر سنة دراسية أولاً";
const MSG_INVALID_OPTION: &str = "❌ خيار غير صحيح";
const MSG_PICK_SUBJECT_FIRST: &str = "⚠️ اختر مادة واحدة على الأقل";
const MSG_PICK_TEACHER_FIRST: &str = "⚠️ اختر أستاذًا واحدًا على الأقل";
pub(crate) const MSG_USE_BUTTONS: &str = "⚠️ استخدم الأزرار للاختيار.";
pub(crate) const MSG_SAVE_FAILED: &str = "❌ حدث خطأ أثناء التسجيل. حاول مجددًا.";

/// Which input the conversation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Name,
    Phone,
    Year,
    Subjects,
    Teachers,
}

/// Partially built student record.
#[derive(Debug, Default)]
struct Draft {
    name: Option<String>,
    phone: Option<String>,
    year: Option<String>,
    subjects: Vec<String>,
    teachers: Vec<String>,
}

/// Per-user student registration state machine.
pub struct StudentFlow {
    stage: Stage,
    draft: Draft,
}

impl StudentFlow {
    /// Initialize an empty draft and produce the first prompt.
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
            Stage::Year => "year",
            Stage::Subjects => "subjects",
            Stage::Teachers => "teachers",
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
            (Stage::Year, Event::Choice(data)) => Ok(self.on_year_choice(data)),
            (Stage::Subjects, Event::Choice(data)) => Ok(self.on_subject_choice(data)),
            (Stage::Teachers, Event::Choice(data)) => self.on_teacher_choice(ctx, user_id, data).await,
            // Free text while a button stage is active.
            (_, Event::Text(_)) => Ok(Step::stay(Reply::text(MSG_USE_BUTTONS))),
            // Stray button press while waiting for text.
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

        // Duplicate-registration guard: short-circuit without writing.
        if ctx.records.find_student_by_phone(&phone).await?.is_some() {
            return Ok(Step::leave(Reply::text(MSG_ALREADY_REGISTERED)));
        }

        self.draft.phone = Some(phone);
        self.stage = Stage::Year;
        Ok(Step::stay(Reply::with_keyboard(
            MSG_ASK_YEAR,
            years_keyboard(None),
        )))
    }

    fn on_year_choice(&mut self, data: &str) -> Step {
        let Some(value) = data.strip_prefix("year:") else {
            return Step::stay_silent();
        };

        if value == "done" {
            let Some(year) = self.draft.year.clone() else {
                return Step::stay(Reply::text(MSG_PICK_YEAR_FIRST));
            };
            self.stage = Stage::Subjects;
            return Step::stay(Reply::with_keyboard(
                format!("✅ السنة الدراسية: {year}\n\n📚 اختر المواد الدراسية التي تتابعها:"),
                subjects_keyboard(&[]),
            ));
        }

        if !YEARS.contains(&value) {
            return Step::stay(Reply::text(MSG_INVALID_OPTION));
        }

        // Single-select: re-picking replaces the current choice.
        self.draft.year = Some(value.to_string());
        Step::stay(Reply::with_keyboard(
            format!("✅ تم اختيار: {value}"),
            years_keyboard(Some(value)),
        ))
    }

    fn on_subject_choice(&mut self, data: &str) -> Step {
        let Some(value) = data.strip_prefix("subj:") else {
            return Step::stay_silent();
        };

        if value == "done" {
            if self.draft.subjects.is_empty() {
                return Step::stay(Reply::text(MSG_PICK_SUBJECT_FIRST));
            }
            self.stage = Stage::Teachers;
            return Step::stay(Reply::with_keyboard(
                format!(
                    "✅ المواد المختارة: {}\n\n👨‍🏫 اختر الأساتذة الذين تتابع عندهم:",
                    self.draft.subjects.join(", ")
                ),
                teachers_keyboard(&[]),
            ));
        }

        if !SUBJECTS.contains(&value) {
            return Step::stay(Reply::text(MSG_INVALID_OPTION));
        }

        // Idempotent add: re-selecting is a no-op.
        if !self.draft.subjects.iter().any(|s| s == value) {
            self.draft.subjects.push(value.to_string());
        }
        Step::stay(Reply::with_keyboard(
            format!("✅ أُضيفت: {value}"),
            subjects_keyboard(&self.draft.subjects),
        ))
    }

    async fn on_teacher_choice(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
        data: &str,
    ) -> Result<Step, crate::error::Error> {
        let Some(value) = data.strip_prefix("tch:") else {
            return Ok(Step::stay_silent());
        };

        if value == "done" {
            if self.draft.teachers.is_empty() {
                return Ok(Step::stay(Reply::text(MSG_PICK_TEACHER_FIRST)));
            }
            return self.finish(ctx, user_id).await;
        }

        if !TEACHERS.contains(&value) {
            return Ok(Step::stay(Reply::text(MSG_INVALID_OPTION)));
        }

        if !self.draft.teachers.iter().any(|t| t == value) {
            self.draft.teachers.push(value.to_string());
        }
        Ok(Step::stay(Reply::with_keyboard(
            format!("✅ أُضيف: {value}"),
            teachers_keyboard(&self.draft.teachers),
        )))
    }

    /// Validate the draft, persist it, and leave.
    async fn finish(
        &mut self,
        ctx: &FlowContext,
        user_id: &str,
    ) -> Result<Step, crate::error::Error> {
        let student = Student {
            name: self.draft.name.clone().unwrap_or_default(),
            phone: self.draft.phone.clone().unwrap_or_default(),
            year: self.draft.year.clone().unwrap_or_default(),
            subjects: self.draft.subjects.clone(),
            teachers: self.draft.teachers.clone(),
            telegram_id: user_id.to_string(),
            student_id: generate_record_id(RecordKind::Student),
            registered_at: Utc::now(),
        };

        if let Err(e) = validate_student(&student) {
            // No retry loop: the user restarts with a fresh /start.
            warn!(user = user_id, error = %e, "Student draft failed validation");
            return Ok(Step::leave(Reply::text(MSG_SAVE_FAILED)));
        }

        ctx.records.add_student(&student).await?;

        info!(user = user_id, student_id = %student.student_id, name = %student.name,
            "Student registered successfully");

        Ok(Step::leave(Reply::text(format!(
            "✅ تم تسجيلك بنجاح!\n\n🆔 رقمك التعريفي: `{}`\n\n🔔 فعّل الإشعارات لتصلك تحديثات موادك وحضورك.",
            student.student_id
        ))))
    }
}
