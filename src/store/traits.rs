//! `Repository` trait — the async persistence interface the flows consume.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Parent, Student};

/// Backend-agnostic record store.
///
/// Lookups by phone or ID are done over the (cached) listings in
/// [`crate::records::RecordStore`]; backends only need bulk reads and
/// appends. Phone uniqueness per kind is enforced by the backend.
#[async_trait]
pub trait Repository: Send + Sync {
    /// List all student records.
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;

    /// List all parent records.
    async fn list_parents(&self) -> Result<Vec<Parent>, StoreError>;

    /// Append a new student record.
    async fn append_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Append a new parent record.
    async fn append_parent(&self, parent: &Parent) -> Result<(), StoreError>;
}
