//! Inline keyboard builders for the registration and admin conversations.

use crate::messenger::{Button, InlineKeyboard};
use crate::model::{SUBJECTS, TEACHERS, YEARS};

const DONE_LABEL: &str = "تم ✅";
const CANCEL_LABEL: &str = "❌ إلغاء";

/// Role menu shown on /start. The admin button only appears for admins.
pub fn role_menu(is_admin: bool) -> InlineKeyboard {
    let mut kb = InlineKeyboard::new(vec![vec![
        Button::new("👨‍🎓 طالب", "role:student"),
        Button::new("👨‍👩‍👧 ولي أمر", "role:parent"),
    ]]);
    if is_admin {
        kb.push_row(vec![Button::new("⚙️ لوحة المدير", "role:admin")]);
    }
    kb
}

/// Single-select year keyboard: the current pick carries a checkmark, and a
/// terminal "done" row confirms it.
pub fn years_keyboard(selected: Option<&str>) -> InlineKeyboard {
    let mut kb = InlineKeyboard::default();
    for year in YEARS {
        let label = if selected == Some(year) {
            format!("✅ {year}")
        } else {
            year.to_string()
        };
        kb.push_row(vec![Button::new(label, format!("year:{year}"))]);
    }
    kb.push_row(vec![Button::new(DONE_LABEL, "year:done")]);
    kb
}

/// Year picker for the broadcast audience: no "done" row, cancel instead.
pub fn broadcast_years_keyboard() -> InlineKeyboard {
    let mut kb = InlineKeyboard::default();
    for year in YEARS {
        kb.push_row(vec![Button::new(year, format!("year:{year}"))]);
    }
    kb.push_row(vec![Button::new(CANCEL_LABEL, "adm:cancel")]);
    kb
}

/// Multi-select keyboard: already-picked options are hidden, two options per
/// row, and the "done" row only appears once something is selected.
fn multi_select_keyboard(options: &[&str], selected: &[String], prefix: &str) -> InlineKeyboard {
    let mut kb = InlineKeyboard::default();
    let remaining: Vec<&&str> = options
        .iter()
        .filter(|opt| !selected.iter().any(|s| s == **opt))
        .collect();

    for pair in remaining.chunks(2) {
        kb.push_row(
            pair.iter()
                .map(|opt| Button::new(**opt, format!("{prefix}:{opt}")))
                .collect(),
        );
    }
    if !selected.is_empty() {
        kb.push_row(vec![Button::new(DONE_LABEL, format!("{prefix}:done"))]);
    }
    kb
}

pub fn subjects_keyboard(selected: &[String]) -> InlineKeyboard {
    multi_select_keyboard(&SUBJECTS, selected, "subj")
}

pub fn teachers_keyboard(selected: &[String]) -> InlineKeyboard {
    multi_select_keyboard(&TEACHERS, selected, "tch")
}

/// Admin panel: broadcast audience choices.
pub fn admin_panel_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![
            Button::new("👨‍🎓 للطلاب", "adm:students"),
            Button::new("👨‍👩‍👧 للأولياء", "adm:parents"),
        ],
        vec![Button::new("🎓 حسب السنة", "adm:year")],
        vec![Button::new(CANCEL_LABEL, "adm:cancel")],
    ])
}

/// Broadcast preview confirmation.
pub fn confirm_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![Button::new("✅ تأكيد الإرسال", "bc:confirm")],
        vec![Button::new(CANCEL_LABEL, "adm:cancel")],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_menu_hides_admin_button() {
        assert!(!role_menu(false).buttons().any(|b| b.data == "role:admin"));
        assert!(role_menu(true).buttons().any(|b| b.data == "role:admin"));
    }

    #[test]
    fn years_keyboard_marks_selection() {
        let kb = years_keyboard(Some("2 متوسط"));
        let labels: Vec<&str> = kb.buttons().map(|b| b.label.as_str()).collect();
        assert!(labels.contains(&"✅ 2 متوسط"));
        assert!(labels.contains(&"1 متوسط"));
        assert!(kb.buttons().any(|b| b.data == "year:done"));
    }

    #[test]
    fn multi_select_hides_picked_options() {
        let kb = subjects_keyboard(&["رياضيات".to_string()]);
        assert!(!kb.buttons().any(|b| b.label == "رياضيات"));
        assert!(kb.buttons().any(|b| b.data == "subj:done"));
    }

    #[test]
    fn multi_select_without_picks_has_no_done() {
        let kb = teachers_keyboard(&[]);
        assert!(!kb.buttons().any(|b| b.data == "tch:done"));
        // all options present, two per row
        assert_eq!(kb.buttons().count(), TEACHERS.len());
        assert!(kb.rows.iter().all(|row| row.len() <= 2));
    }
}
