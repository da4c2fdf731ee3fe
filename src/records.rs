//! `RecordStore` — the lookup/append surface the flows use, combining the
//! repository with time-bounded listing caches.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::TtlCell;
use crate::error::StoreError;
use crate::model::{Parent, Student};
use crate::store::Repository;

/// Repository facade with per-kind listing caches.
///
/// Appends invalidate the matching listing before returning, so the next
/// read is fresh.
pub struct RecordStore {
    repo: Arc<dyn Repository>,
    students: TtlCell<Vec<Student>>,
    parents: TtlCell<Vec<Parent>>,
}

impl RecordStore {
    pub fn new(repo: Arc<dyn Repository>, cache_ttl: Duration) -> Self {
        Self {
            repo,
            students: TtlCell::new(cache_ttl),
            parents: TtlCell::new(cache_ttl),
        }
    }

    /// All student records, served from cache when fresh.
    pub async fn list_students(&self) -> Result<Arc<Vec<Student>>, StoreError> {
        if let Some(cached) = self.students.get().await {
            return Ok(cached);
        }
        let fresh = self.repo.list_students().await?;
        Ok(self.students.set(fresh).await)
    }

    /// All parent records, served from cache when fresh.
    pub async fn list_parents(&self) -> Result<Arc<Vec<Parent>>, StoreError> {
        if let Some(cached) = self.parents.get().await {
            return Ok(cached);
        }
        let fresh = self.repo.list_parents().await?;
        Ok(self.parents.set(fresh).await)
    }

    pub async fn find_student_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Student>, StoreError> {
        let students = self.list_students().await?;
        Ok(students.iter().find(|s| s.phone == phone).cloned())
    }

    pub async fn find_student_by_id(&self, id: &str) -> Result<Option<Student>, StoreError> {
        let students = self.list_students().await?;
        Ok(students.iter().find(|s| s.student_id == id).cloned())
    }

    pub async fn find_parent_by_phone(&self, phone: &str) -> Result<Option<Parent>, StoreError> {
        let parents = self.list_parents().await?;
        Ok(parents.iter().find(|p| p.phone == phone).cloned())
    }

    /// Persist a student and invalidate the student listing.
    pub async fn add_student(&self, student: &Student) -> Result<(), StoreError> {
        self.repo.append_student(student).await?;
        self.students.invalidate().await;
        info!(student_id = %student.student_id, "Student registered");
        Ok(())
    }

    /// Persist a parent and invalidate the parent listing.
    pub async fn add_parent(&self, parent: &Parent) -> Result<(), StoreError> {
        self.repo.append_parent(parent).await?;
        self.parents.invalidate().await;
        info!(parent_id = %parent.parent_id, status = %parent.link_status, "Parent registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkStatus, RecordKind, generate_record_id};
    use crate::store::MemoryRepository;
    use chrono::Utc;

    fn make_store() -> RecordStore {
        RecordStore::new(Arc::new(MemoryRepository::new()), Duration::from_secs(3600))
    }

    fn student(phone: &str, year: &str) -> Student {
        Student {
            name: "Ahmed Benali".into(),
            phone: phone.into(),
            year: year.into(),
            subjects: vec!["رياضيات".into()],
            teachers: vec!["الأستاذ قادري".into()],
            telegram_id: "1001".into(),
            student_id: generate_record_id(RecordKind::Student),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn find_by_phone_hits_after_add() {
        let store = make_store();
        store.add_student(&student("+213555123456", "2 متوسط")).await.unwrap();
        let found = store.find_student_by_phone("+213555123456").await.unwrap();
        assert!(found.is_some());
        assert!(store.find_student_by_phone("+213555999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_id() {
        let store = make_store();
        let s = student("+213555123456", "2 متوسط");
        store.add_student(&s).await.unwrap();
        let found = store.find_student_by_id(&s.student_id).await.unwrap().unwrap();
        assert_eq!(found.phone, s.phone);
    }

    #[tokio::test]
    async fn add_invalidates_cached_listing() {
        let store = make_store();
        // Prime the cache with an empty listing.
        assert!(store.list_students().await.unwrap().is_empty());
        store.add_student(&student("+213555123456", "2 متوسط")).await.unwrap();
        // A stale cache would still say empty here.
        assert_eq!(store.list_students().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn parent_listing_is_cached_separately() {
        let store = make_store();
        let parent = Parent {
            name: "Karim Benali".into(),
            phone: "+213666123456".into(),
            child_ref: "STU-1-1".into(),
            link_status: LinkStatus::Unlinked,
            telegram_id: "1002".into(),
            parent_id: generate_record_id(RecordKind::Parent),
            registered_at: Utc::now(),
        };
        assert!(store.list_parents().await.unwrap().is_empty());
        store.add_parent(&parent).await.unwrap();
        assert_eq!(store.list_parents().await.unwrap().len(), 1);
        assert!(
            store
                .find_parent_by_phone("+213666123456")
                .await
                .unwrap()
                .is_some()
        );
    }
}
