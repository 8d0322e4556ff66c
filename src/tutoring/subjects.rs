//! Canonical subject names and the lazily populated subject embedding registry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::services::embedding_provider::{EmbeddingError, EmbeddingProvider};
use crate::store::operations::subjects::SubjectRow;
use crate::store::operations::users::Role;
use crate::store::{Store, StoreError};

/// Canonical lookup key: trimmed, first character uppercased, the rest lowercased.
pub fn canonicalize_subject(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Split a comma separated subject string into sorted, unique canonical names.
pub fn split_subjects(raw: &str) -> Vec<String> {
    canonical_set(raw.split(','))
}

/// Canonicalize, drop empties, dedupe and sort a list of subject names.
pub fn canonical_set<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .flat_map(|n| {
            n.as_ref()
                .split(',')
                .map(canonicalize_subject)
                .collect::<Vec<_>>()
        })
        .filter(|n| !n.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn join_subjects(names: &[String]) -> String {
    names.join(", ")
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no embedding stored for subjects: {}", .names.join(", "))]
    MissingEmbedding { names: Vec<String> },
    #[error("subject name is empty")]
    EmptyName,
    #[error("embedding provider failed for {subject}: {source}")]
    Provider {
        subject: String,
        #[source]
        source: EmbeddingError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyPresent,
}

/// Embeddings found for a lookup plus the names that had none.
#[derive(Debug, Default, Clone)]
pub struct ResolvedEmbeddings {
    pub found: BTreeMap<String, Vec<f64>>,
    pub missing: Vec<String>,
}

#[derive(Clone)]
pub struct SubjectRegistry {
    store: Arc<Store>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SubjectRegistry {
    pub fn new(store: Arc<Store>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Make sure `subject` has a stored embedding, calling the provider only when
    /// the row is absent. Concurrent callers may both call the provider; the first
    /// stored row wins.
    pub async fn ensure_embedded(&self, subject: &str) -> Result<EnsureOutcome, RegistryError> {
        let name = canonicalize_subject(subject);
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.store.has_subject(&name)? {
            return Ok(EnsureOutcome::AlreadyPresent);
        }

        let embedding = self
            .provider
            .embed(&name)
            .await
            .map_err(|source| RegistryError::Provider {
                subject: name.clone(),
                source,
            })?;

        let now = Utc::now();
        let row = SubjectRow {
            name: name.clone(),
            embedding,
            tutor_count: 0,
            tutee_count: 0,
            created_at: now,
            updated_at: now,
        };
        if self.store.insert_subject_if_absent(&row)? {
            tracing::info!(subject = %name, provider = self.provider.name(), "Stored subject embedding");
            Ok(EnsureOutcome::Created)
        } else {
            Ok(EnsureOutcome::AlreadyPresent)
        }
    }

    /// Look up embeddings for every name, reporting the ones that have none.
    pub fn resolve_embeddings(&self, names: &[String]) -> Result<ResolvedEmbeddings, RegistryError> {
        let mut resolved = ResolvedEmbeddings::default();
        for name in canonical_set(names) {
            match self.store.get_subject(&name)? {
                Some(row) => {
                    resolved.found.insert(name, row.embedding);
                }
                None => resolved.missing.push(name),
            }
        }
        Ok(resolved)
    }

    /// Embeddings keyed by canonical name; fails naming every subject without one.
    pub fn get_embeddings(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, Vec<f64>>, RegistryError> {
        let resolved = self.resolve_embeddings(names)?;
        if !resolved.missing.is_empty() {
            return Err(RegistryError::MissingEmbedding {
                names: resolved.missing,
            });
        }
        Ok(resolved.found)
    }

    /// Bump the tutor or tutee counter of each subject. Failures are logged per
    /// subject and do not stop the remaining updates.
    pub fn record_usage(&self, names: &[String], role: Role) -> usize {
        let mut updated = 0;
        for name in names {
            match self.store.increment_subject_count(name, role) {
                Ok(()) => updated += 1,
                Err(e) => {
                    tracing::warn!(subject = %name, role = role.as_str(), error = %e, "Failed to update subject usage count")
                }
            }
        }
        updated
    }

    pub fn list_subjects(&self) -> Result<Vec<SubjectRow>, RegistryError> {
        let mut rows = self.store.list_subjects()?;
        rows.sort_by(|a, b| {
            (b.tutor_count + b.tutee_count)
                .cmp(&(a.tutor_count + a.tutee_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }
}
