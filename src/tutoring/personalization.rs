//! Profile personalisation: the mean subject embedding plus teaching or learning
//! preferences, written onto the user profile in a single update.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::store::operations::users::{Role, User};
use crate::store::{Store, StoreError};
use crate::tutoring::subjects::{canonical_set, RegistryError, SubjectRegistry};
use crate::tutoring::vector::{average_vectors, VectorError};

#[derive(Debug, Error)]
pub enum PersonalizationError {
    #[error("at least one subject is required")]
    NoSubjects,
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("could not compute the subject embedding: {0}")]
    AveragingFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<VectorError> for PersonalizationError {
    fn from(value: VectorError) -> Self {
        Self::AveragingFailed(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PersonalizationRequest {
    pub subjects: Vec<String>,
    pub levels: Vec<String>,
}

#[derive(Clone)]
pub struct PersonalizationWriter {
    store: Arc<Store>,
    registry: SubjectRegistry,
}

impl PersonalizationWriter {
    pub fn new(store: Arc<Store>, registry: SubjectRegistry) -> Self {
        Self { store, registry }
    }

    /// Compute the mean embedding of the requested subjects and persist it with the
    /// sorted subject and level lists. Nothing is written unless every step succeeds.
    pub async fn personalise(
        &self,
        user_id: &str,
        request: &PersonalizationRequest,
    ) -> Result<User, PersonalizationError> {
        let subjects = canonical_set(&request.subjects);
        if subjects.is_empty() {
            return Err(PersonalizationError::NoSubjects);
        }
        let role = self
            .store
            .get_user_by_id(user_id)?
            .ok_or_else(|| PersonalizationError::UserNotFound(user_id.to_string()))?
            .role;

        let outcomes = join_all(subjects.iter().map(|s| self.registry.ensure_embedded(s))).await;
        for (subject, outcome) in subjects.iter().zip(&outcomes) {
            if let Err(e) = outcome {
                tracing::warn!(user_id, subject = %subject, error = %e, "Failed to ensure subject embedding");
            }
        }

        let resolved = self.registry.resolve_embeddings(&subjects)?;
        if resolved.found.is_empty() {
            return Err(PersonalizationError::AveragingFailed(
                "no subject embeddings could be resolved".to_string(),
            ));
        }
        if !resolved.missing.is_empty() {
            return Err(RegistryError::MissingEmbedding {
                names: resolved.missing,
            }
            .into());
        }

        let vectors: Vec<&Vec<f64>> = resolved.found.values().collect();
        let mean = average_vectors(&vectors)?;

        let mut levels: Vec<String> = request
            .levels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        levels.sort();
        levels.dedup();

        let user = self
            .store
            .modify_user(user_id, |user| {
                match role {
                    Role::Tutor => {
                        user.embedded_subject_to_teach = Some(mean.clone());
                        user.subjects_to_teach = subjects.clone();
                        user.teaching_level = levels.clone();
                    }
                    Role::Tutee => {
                        user.embedded_subject_to_learn = Some(mean.clone());
                        user.subjects_to_learn = subjects.clone();
                        user.learning_level = levels.clone();
                    }
                }
                user.personalised = true;
            })
            .map_err(|e| match e {
                StoreError::NotFound { .. } => PersonalizationError::UserNotFound(user_id.to_string()),
                other => other.into(),
            })?;

        let counted = self.registry.record_usage(&subjects, role);
        tracing::info!(
            user_id,
            role = role.as_str(),
            subjects = subjects.len(),
            counted,
            "Profile personalised"
        );
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::services::embedding_provider::EmbeddingProvider;
    use crate::tutoring::subjects::test_support::TableProvider;

    fn writer(
        name: &str,
        provider: Arc<TableProvider>,
    ) -> (tempfile::TempDir, Arc<Store>, PersonalizationWriter) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join(name).to_str().unwrap()).unwrap());
        let provider: Arc<dyn EmbeddingProvider> = provider;
        let registry = SubjectRegistry::new(store.clone(), provider);
        let writer = PersonalizationWriter::new(store.clone(), registry);
        (dir, store, writer)
    }

    fn request(subjects: &[&str], levels: &[&str]) -> PersonalizationRequest {
        PersonalizationRequest {
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            levels: levels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn tutor_profile_gets_mean_embedding() {
        let provider = Arc::new(TableProvider::new(&[
            ("Math", vec![1.0, 0.0]),
            ("Physics", vec![0.0, 1.0]),
        ]));
        let (_dir, store, writer) = writer("personalise_tutor", provider);
        store.create_user(&User::new("u1", Role::Tutor, "Alice")).unwrap();

        let user = writer
            .personalise(
                "u1",
                &request(&["Physics", "math"], &["Secondary", "JC", "Secondary"]),
            )
            .await
            .unwrap();

        assert_eq!(user.embedded_subject_to_teach, Some(vec![0.5, 0.5]));
        assert_eq!(user.subjects_to_teach, vec!["Math", "Physics"]);
        assert_eq!(user.teaching_level, vec!["JC", "Secondary"]);
        assert!(user.personalised);

        let stored = store.require_user("u1").unwrap();
        assert_eq!(stored.embedded_subject_to_teach, Some(vec![0.5, 0.5]));
        assert_eq!(store.get_subject("Math").unwrap().unwrap().tutor_count, 1);
    }

    #[tokio::test]
    async fn tutee_profile_uses_learning_fields() {
        let provider = Arc::new(TableProvider::new(&[("Chemistry", vec![0.2, 0.4])]));
        let (_dir, store, writer) = writer("personalise_tutee", provider);
        store.create_user(&User::new("u2", Role::Tutee, "Bob")).unwrap();

        let user = writer
            .personalise("u2", &request(&["chemistry"], &["Primary"]))
            .await
            .unwrap();
        assert_eq!(user.embedded_subject_to_learn, Some(vec![0.2, 0.4]));
        assert!(user.embedded_subject_to_teach.is_none());
        assert_eq!(user.subjects_to_learn, vec!["Chemistry"]);
        assert_eq!(store.get_subject("Chemistry").unwrap().unwrap().tutee_count, 1);
    }

    #[tokio::test]
    async fn zero_resolvable_embeddings_abort_without_write() {
        let provider = Arc::new(TableProvider::new(&[]));
        let (_dir, store, writer) = writer("personalise_none", provider);
        let original = User::new("u1", Role::Tutor, "Alice");
        store.create_user(&original).unwrap();

        let err = writer
            .personalise("u1", &request(&["Math", "Physics"], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PersonalizationError::AveragingFailed(_)));

        let stored = store.require_user("u1").unwrap();
        assert!(!stored.personalised);
        assert!(stored.embedded_subject_to_teach.is_none());
        assert!(stored.subjects_to_teach.is_empty());
    }

    #[tokio::test]
    async fn partially_missing_embeddings_abort_without_write() {
        let provider = Arc::new(TableProvider::new(&[("Math", vec![1.0, 0.0])]));
        let (_dir, store, writer) = writer("personalise_partial", provider);
        store.create_user(&User::new("u1", Role::Tutor, "Alice")).unwrap();

        let err = writer
            .personalise("u1", &request(&["Math", "Astrology"], &[]))
            .await
            .unwrap_err();
        match err {
            PersonalizationError::Registry(RegistryError::MissingEmbedding { names }) => {
                assert_eq!(names, vec!["Astrology"])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!store.require_user("u1").unwrap().personalised);
    }

    #[tokio::test]
    async fn inconsistent_dimensions_surface_averaging_failure() {
        let provider = Arc::new(TableProvider::new(&[
            ("Math", vec![1.0, 0.0]),
            ("Physics", vec![0.0, 1.0, 0.0]),
        ]));
        let (_dir, store, writer) = writer("personalise_dims", provider);
        store.create_user(&User::new("u1", Role::Tutor, "Alice")).unwrap();

        let err = writer
            .personalise("u1", &request(&["Math", "Physics"], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PersonalizationError::AveragingFailed(_)));
        assert!(!store.require_user("u1").unwrap().personalised);
    }

    struct GatedProvider {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[axum::async_trait]
    impl EmbeddingProvider for GatedProvider {
        async fn embed(
            &self,
            _subject: &str,
        ) -> Result<Vec<f64>, crate::services::embedding_provider::EmbeddingError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![0.25, 0.75])
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn writes_during_embedding_survive_personalisation() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("personalise_race").to_str().unwrap()).unwrap());
        let provider = Arc::new(GatedProvider {
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let registry = SubjectRegistry::new(store.clone(), provider.clone());
        let writer = PersonalizationWriter::new(store.clone(), registry);
        store.create_user(&User::new("t1", Role::Tutor, "Alice")).unwrap();

        let task = tokio::spawn({
            let writer = writer.clone();
            async move { writer.personalise("t1", &request(&["Math"], &["JC"])).await }
        });

        provider.entered.notified().await;
        store
            .modify_user("t1", |u| u.review_ids.push("r1".to_string()))
            .unwrap();
        provider.release.notify_one();

        let user = task.await.unwrap().unwrap();
        assert_eq!(user.review_ids, vec!["r1"]);

        let stored = store.require_user("t1").unwrap();
        assert_eq!(stored.review_ids, vec!["r1"]);
        assert_eq!(stored.embedded_subject_to_teach, Some(vec![0.25, 0.75]));
        assert!(stored.personalised);
    }

    #[tokio::test]
    async fn empty_subjects_and_unknown_user_are_rejected() {
        let provider = Arc::new(TableProvider::new(&[("Math", vec![1.0])]));
        let (_dir, _store, writer) = writer("personalise_invalid", provider);

        assert!(matches!(
            writer.personalise("u1", &request(&["  ", ""], &[])).await,
            Err(PersonalizationError::NoSubjects)
        ));
        assert!(matches!(
            writer.personalise("ghost", &request(&["Math"], &[])).await,
            Err(PersonalizationError::UserNotFound(_))
        ));
    }
}
