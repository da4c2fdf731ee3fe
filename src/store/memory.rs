//! In-memory `Repository` backend, used in tests and for local runs
//! without a database file.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{Parent, Student};
use crate::store::traits::Repository;

/// Repository backed by process memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryRepository {
    students: RwLock<Vec<Student>>,
    parents: RwLock<Vec<Parent>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.students.read().await.clone())
    }

    async fn list_parents(&self) -> Result<Vec<Parent>, StoreError> {
        Ok(self.parents.read().await.clone())
    }

    async fn append_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut students = self.students.write().await;
        if students.iter().any(|s| s.phone == student.phone) {
            return Err(StoreError::Constraint(format!(
                "student phone already registered: {}",
                student.phone
            )));
        }
        students.push(student.clone());
        Ok(())
    }

    async fn append_parent(&self, parent: &Parent) -> Result<(), StoreError> {
        let mut parents = self.parents.write().await;
        if parents.iter().any(|p| p.phone == parent.phone) {
            return Err(StoreError::Constraint(format!(
                "parent phone already registered: {}",
                parent.phone
            )));
        }
        parents.push(parent.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkStatus, RecordKind, generate_record_id};
    use chrono::Utc;

    fn student(phone: &str) -> Student {
        Student {
            name: "Ahmed Benali".into(),
            phone: phone.into(),
            year: "2 متوسط".into(),
            subjects: vec!["رياضيات".into()],
            teachers: vec!["الأستاذ قادري".into()],
            telegram_id: "1001".into(),
            student_id: generate_record_id(RecordKind::Student),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_and_list() {
        let repo = MemoryRepository::new();
        repo.append_student(&student("+213555123456")).await.unwrap();
        let all = repo.list_students().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].phone, "+213555123456");
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_constraint_violation() {
        let repo = MemoryRepository::new();
        repo.append_student(&student("+213555123456")).await.unwrap();
        let err = repo.append_student(&student("+213555123456")).await;
        assert!(matches!(err, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn parent_roundtrip() {
        let repo = MemoryRepository::new();
        let parent = Parent {
            name: "Karim Benali".into(),
            phone: "+213666123456".into(),
            child_ref: "+213555123456".into(),
            link_status: LinkStatus::Linked,
            telegram_id: "1002".into(),
            parent_id: generate_record_id(RecordKind::Parent),
            registered_at: Utc::now(),
        };
        repo.append_parent(&parent).await.unwrap();
        let all = repo.list_parents().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].link_status, LinkStatus::Linked);
    }
}
