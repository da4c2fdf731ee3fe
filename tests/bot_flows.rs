//! End-to-end conversation tests driven through the router, with an
//! in-memory repository and a capturing messenger standing in for Telegram.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kabo_bot::config::{BotConfig, BroadcastConfig};
use kabo_bot::error::MessengerError;
use kabo_bot::flows::{Event, FlowContext};
use kabo_bot::messenger::{InlineKeyboard, Messenger};
use kabo_bot::model::LinkStatus;
use kabo_bot::records::RecordStore;
use kabo_bot::router::Router;
use kabo_bot::store::MemoryRepository;

/// Records every outbound message; recipients listed in `rate_limited`
/// always fail with the channel's rate limit.
#[derive(Default)]
struct CapturingMessenger {
    sent: Mutex<Vec<(String, String)>>,
    rate_limited: Vec<String>,
}

impl CapturingMessenger {
    fn texts_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, t)| t.clone())
            .collect()
    }

    fn record(&self, recipient: &str, text: &str) -> Result<(), MessengerError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        if self.rate_limited.iter().any(|r| r == recipient) {
            return Err(MessengerError::RateLimited {
                recipient: recipient.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for CapturingMessenger {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), MessengerError> {
        self.record(recipient, text)
    }

    async fn send_with_keyboard(
        &self,
        recipient: &str,
        text: &str,
        _keyboard: &InlineKeyboard,
    ) -> Result<(), MessengerError> {
        self.record(recipient, text)
    }
}

fn make_router(messenger: Arc<CapturingMessenger>) -> Router {
    let config = BotConfig {
        admin_ids: vec!["9000".into()],
        broadcast: BroadcastConfig {
            base_delay: Duration::ZERO,
            penalty_delay: Duration::ZERO,
        },
        ..Default::default()
    };
    Router::new(FlowContext {
        records: Arc::new(RecordStore::new(
            Arc::new(MemoryRepository::new()),
            Duration::from_secs(3600),
        )),
        messenger,
        config: Arc::new(config),
    })
}

fn text(s: &str) -> Event {
    Event::Text(s.into())
}

fn choice(s: &str) -> Event {
    Event::Choice(s.into())
}

/// Run a full student registration for one user through the router.
async fn register_student(router: &Router, user: &str, name: &str, phone: &str, year: &str) {
    router.dispatch(user, text("/start")).await;
    router.dispatch(user, choice("role:student")).await;
    router.dispatch(user, text(name)).await;
    router.dispatch(user, text(phone)).await;
    router.dispatch(user, choice(&format!("year:{year}"))).await;
    router.dispatch(user, choice("year:done")).await;
    router.dispatch(user, choice("subj:رياضيات")).await;
    router.dispatch(user, choice("subj:done")).await;
    router.dispatch(user, choice("tch:الأستاذ قادري")).await;
    router.dispatch(user, choice("tch:done")).await;
}

#[tokio::test]
async fn student_registration_then_parent_link() {
    let messenger = Arc::new(CapturingMessenger::default());
    let router = make_router(Arc::clone(&messenger));

    register_student(&router, "100", "Ahmed Benali", "0555123456", "2 متوسط").await;

    let students = router.ctx().records.list_students().await.unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].phone, "+213555123456");

    // Parent registers referencing the child's phone in a local spelling.
    router.dispatch("200", text("/start")).await;
    router.dispatch("200", choice("role:parent")).await;
    router.dispatch("200", text("Karim Benali")).await;
    router.dispatch("200", text("0666123456")).await;
    router.dispatch("200", text("00213555123456")).await;

    let parents = router.ctx().records.list_parents().await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].link_status, LinkStatus::Linked);
    assert_eq!(parents[0].child_ref, "+213555123456");

    let confirmation = messenger.texts_to("200");
    assert!(confirmation.last().unwrap().contains("Ahmed Benali"));
}

#[tokio::test]
async fn admin_broadcast_reaches_all_students() {
    let messenger = Arc::new(CapturingMessenger::default());
    let router = make_router(Arc::clone(&messenger));

    register_student(&router, "100", "Ahmed Benali", "0555000001", "1 متوسط").await;
    register_student(&router, "101", "Sara Khelifi", "0666000002", "2 متوسط").await;

    router.dispatch("9000", text("/admin")).await;
    router.dispatch("9000", choice("adm:students")).await;
    router.dispatch("9000", text("غدا عطلة")).await;
    router.dispatch("9000", choice("bc:confirm")).await;

    assert_eq!(messenger.texts_to("100").last().unwrap(), "غدا عطلة");
    assert_eq!(messenger.texts_to("101").last().unwrap(), "غدا عطلة");

    let report = messenger.texts_to("9000");
    let last = report.last().unwrap();
    assert!(last.contains("الإجمالي: 2"), "report: {last}");
    assert!(last.contains("نجح: 2"), "report: {last}");
    assert!(last.contains("فشل: 0"), "report: {last}");
}

#[tokio::test]
async fn year_broadcast_counts_rate_limited_recipient_as_failed() {
    let messenger = Arc::new(CapturingMessenger {
        rate_limited: vec!["101".into()],
        ..Default::default()
    });
    let router = make_router(Arc::clone(&messenger));

    register_student(&router, "100", "Ahmed Benali", "0555000001", "3 متوسط").await;
    register_student(&router, "101", "Sara Khelifi", "0666000002", "3 متوسط").await;
    register_student(&router, "102", "Yacine Brahimi", "0777000003", "1 متوسط").await;

    router.dispatch("9000", text("/admin")).await;
    router.dispatch("9000", choice("adm:year")).await;
    router.dispatch("9000", choice("year:3 متوسط")).await;
    router.dispatch("9000", text("اجتماع الأولياء")).await;
    router.dispatch("9000", choice("bc:confirm")).await;

    // The off-year student was never contacted.
    assert!(messenger.texts_to("102").is_empty());

    let report = messenger.texts_to("9000");
    let last = report.last().unwrap();
    assert!(last.contains("الإجمالي: 2"), "report: {last}");
    assert!(last.contains("نجح: 1"), "report: {last}");
    assert!(last.contains("فشل: 1"), "report: {last}");
}

#[tokio::test]
async fn duplicate_student_phone_is_rejected_across_users() {
    let messenger = Arc::new(CapturingMessenger::default());
    let router = make_router(Arc::clone(&messenger));

    register_student(&router, "100", "Ahmed Benali", "0555123456", "1 متوسط").await;

    // Second user enters the same phone in a different spelling.
    router.dispatch("300", text("/start")).await;
    router.dispatch("300", choice("role:student")).await;
    router.dispatch("300", text("Someone Else")).await;
    router.dispatch("300", text("+213555123456")).await;

    assert_eq!(router.ctx().records.list_students().await.unwrap().len(), 1);
    assert!(messenger
        .texts_to("300")
        .last()
        .unwrap()
        .contains("مسبقًا"));
}
