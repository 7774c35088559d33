//! In-process implementation of every repository trait.
//!
//! All collections live behind one mutex, so each trait method is a single
//! critical section. That gives the same guarantees the MongoDB
//! implementations get from unique indexes, compare-and-swap filters and
//! transactions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::collaborator_repository::CollaboratorRepository;
use crate::db::comment_repository::CommentRepository;
use crate::db::registration_repository::RegistrationRepository;
use crate::db::repository::DocumentRepository;
use crate::db::version_repository::VersionRepository;
use crate::error::AppError;
use crate::models::collaborator::{Collaborator, PrimarySwap, RoleChange};
use crate::models::comment::Comment;
use crate::models::document::{Document, NewDocument, StatusChange};
use crate::models::registration::{RegistrationRequest, RegistrationStatus, Resolution};
use crate::models::version::{NewVersion, Version};

#[derive(Default)]
struct Collections {
    documents: HashMap<String, Document>,
    /// Per document, in version-number order.
    versions: HashMap<String, Vec<Version>>,
    collaborators: Vec<Collaborator>,
    comments: Vec<Comment>,
    registrations: Vec<RegistrationRequest>,
}

impl Collections {
    fn active_primary_conflict(&self, candidate: &Collaborator) -> bool {
        candidate.is_primary()
            && self.collaborators.iter().any(|c| {
                c.active
                    && c.id != candidate.id
                    && c.document_id == candidate.document_id
                    && c.role == candidate.role
            })
    }

    fn membership_conflict(&self, candidate: &Collaborator) -> bool {
        self.collaborators.iter().any(|c| {
            c.active && c.document_id == candidate.document_id && c.user_id == candidate.user_id
        })
    }

    fn collaborator_mut(&mut self, change: &RoleChange) -> Option<&mut Collaborator> {
        self.collaborators.iter_mut().find(|c| change.matches(c))
    }
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn insert(&self, doc: Document) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if inner.documents.contains_key(&doc.id) {
            return Err(AppError::Conflict(format!("Document '{}' already exists", doc.id)));
        }
        inner.documents.insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn create(&self, new: NewDocument) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let NewDocument {
            document,
            owner,
            initial_version,
        } = new;

        // Validate every record before writing any.
        if inner.documents.contains_key(&document.id) {
            return Err(AppError::Conflict(format!(
                "Document '{}' already exists",
                document.id
            )));
        }
        if inner.active_primary_conflict(&owner) || inner.membership_conflict(&owner) {
            return Err(AppError::Conflict(format!(
                "Document '{}' already has members",
                document.id
            )));
        }
        if let Some(version) = &initial_version {
            let taken = inner.versions.contains_key(&version.document_id)
                || inner.versions.values().flatten().any(|v| v.id == version.id);
            if taken || version.version_number != 1 {
                return Err(AppError::Conflict(format!(
                    "Initial version of document '{}' conflicts with stored versions",
                    document.id
                )));
            }
        }

        if let Some(version) = initial_version {
            inner
                .versions
                .insert(version.document_id.clone(), vec![version]);
        }
        inner.collaborators.push(owner);
        inner.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        Ok(self.lock()?.documents.get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Document>, AppError> {
        let inner = self.lock()?;
        let mut docs: Vec<Document> = ids
            .iter()
            .filter_map(|id| inner.documents.get(id).cloned())
            .collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        docs.dedup_by(|a, b| a.id == b.id);
        Ok(docs)
    }

    async fn transition(
        &self,
        current: &Document,
        change: StatusChange,
    ) -> Result<Option<Document>, AppError> {
        let mut inner = self.lock()?;
        match inner.documents.get_mut(&current.id) {
            Some(doc) if doc.status == current.status && doc.generation == current.generation => {
                doc.apply(&change);
                Ok(Some(doc.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(doc) = self.lock()?.documents.get_mut(id) {
            doc.updated_at = at;
            doc.generation += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl VersionRepository for MemoryStore {
    async fn append(&self, version: NewVersion) -> Result<Version, AppError> {
        let mut inner = self.lock()?;
        let log = inner.versions.entry(version.document_id.clone()).or_default();
        let next = log.last().map(|v| v.version_number + 1).unwrap_or(1);
        let version = version.into_version(next);
        log.push(version.clone());
        Ok(version)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Version>, AppError> {
        Ok(self
            .lock()?
            .versions
            .values()
            .flatten()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Version>, AppError> {
        Ok(self
            .lock()?
            .versions
            .get(document_id)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn latest(&self, document_id: &str) -> Result<Option<Version>, AppError> {
        Ok(self
            .lock()?
            .versions
            .get(document_id)
            .and_then(|log| log.last().cloned()))
    }

    async fn count(&self, document_id: &str) -> Result<u64, AppError> {
        Ok(self
            .lock()?
            .versions
            .get(document_id)
            .map(|log| log.len() as u64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl CollaboratorRepository for MemoryStore {
    async fn insert(&self, collaborator: Collaborator) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if inner.active_primary_conflict(&collaborator) {
            return Err(AppError::InvariantViolation(format!(
                "Document '{}' already has an active {}",
                collaborator.document_id, collaborator.role
            )));
        }
        if inner.membership_conflict(&collaborator) {
            return Err(AppError::Conflict(format!(
                "User '{}' is already a collaborator on document '{}'",
                collaborator.user_id, collaborator.document_id
            )));
        }
        inner.collaborators.push(collaborator);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Collaborator>, AppError> {
        Ok(self
            .lock()?
            .collaborators
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_active(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<Collaborator>, AppError> {
        Ok(self
            .lock()?
            .collaborators
            .iter()
            .find(|c| c.active && c.document_id == document_id && c.user_id == user_id)
            .cloned())
    }

    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Collaborator>, AppError> {
        Ok(self
            .lock()?
            .collaborators
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Collaborator>, AppError> {
        Ok(self
            .lock()?
            .collaborators
            .iter()
            .filter(|c| c.active && c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update(&self, change: RoleChange) -> Result<Option<Collaborator>, AppError> {
        let mut inner = self.lock()?;
        let Some(current) = inner.collaborator_mut(&change).cloned() else {
            return Ok(None);
        };

        let mut updated = current;
        updated.role = change.role;
        updated.permission = change.permission;
        if inner.active_primary_conflict(&updated) {
            return Err(AppError::InvariantViolation(format!(
                "Changing collaborator '{}' to {} would duplicate a primary",
                change.collaborator_id, change.role
            )));
        }

        if let Some(slot) = inner.collaborator_mut(&change) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn deactivate(&self, expected: RoleChange) -> Result<Option<Collaborator>, AppError> {
        let mut inner = self.lock()?;
        Ok(inner.collaborator_mut(&expected).map(|c| {
            c.active = false;
            c.clone()
        }))
    }

    async fn swap_primary(&self, swap: PrimarySwap) -> Result<Collaborator, AppError> {
        let mut inner = self.lock()?;

        // Validate both halves before writing either.
        if let Some(demote) = &swap.demote {
            if inner.collaborator_mut(demote).is_none() {
                return Err(AppError::Conflict(format!(
                    "Current primary '{}' of document '{}' changed concurrently",
                    demote.collaborator_id, swap.document_id
                )));
            }
        }
        let Some(mut promoted) = inner.collaborator_mut(&swap.promote).cloned() else {
            return Err(AppError::Conflict(format!(
                "Collaborator '{}' changed concurrently",
                swap.promote.collaborator_id
            )));
        };
        promoted.role = swap.promote.role;
        promoted.permission = swap.promote.permission;

        let demoted_id = swap.demote.as_ref().map(|d| d.collaborator_id.as_str());
        let blocked = promoted.is_primary()
            && inner.collaborators.iter().any(|c| {
                c.active
                    && c.id != promoted.id
                    && Some(c.id.as_str()) != demoted_id
                    && c.document_id == promoted.document_id
                    && c.role == promoted.role
            });
        if blocked {
            return Err(AppError::Conflict(format!(
                "Document '{}' gained another {} concurrently",
                swap.document_id, promoted.role
            )));
        }

        if let Some(demote) = &swap.demote {
            if let Some(c) = inner.collaborator_mut(demote) {
                c.role = demote.role;
                c.permission = demote.permission;
            }
        }
        if let Some(c) = inner.collaborator_mut(&swap.promote) {
            *c = promoted.clone();
        }

        Ok(promoted)
    }

    async fn touch_access(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(c) = self.lock()?.collaborators.iter_mut().find(|c| c.id == id) {
            c.last_access_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn insert(&self, comment: Comment) -> Result<(), AppError> {
        self.lock()?.comments.push(comment);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Comment>, AppError> {
        Ok(self.lock()?.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn list_by_version(&self, version_id: &str) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .lock()?
            .comments
            .iter()
            .filter(|c| c.version_id == version_id)
            .cloned()
            .collect())
    }

    async fn resolve(
        &self,
        id: &str,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>, AppError> {
        let mut inner = self.lock()?;
        Ok(inner
            .comments
            .iter_mut()
            .find(|c| c.id == id && !c.resolved)
            .map(|c| {
                c.resolved = true;
                c.resolved_by = Some(resolved_by.to_string());
                c.resolved_at = Some(at);
                c.clone()
            }))
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn insert(&self, request: RegistrationRequest) -> Result<(), AppError> {
        self.lock()?.registrations.push(request);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RegistrationRequest>, AppError> {
        Ok(self
            .lock()?
            .registrations
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_pending(&self) -> Result<Vec<RegistrationRequest>, AppError> {
        Ok(self
            .lock()?
            .registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Pending)
            .cloned()
            .collect())
    }

    async fn resolve(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<Option<RegistrationRequest>, AppError> {
        let mut inner = self.lock()?;
        Ok(inner
            .registrations
            .iter_mut()
            .find(|r| r.id == id && r.status == RegistrationStatus::Pending)
            .map(|r| {
                r.apply(&resolution);
                r.clone()
            }))
    }
}
