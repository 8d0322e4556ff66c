use std::collections::BTreeSet;

use crate::store::Store;
use crate::tutoring::subjects::{canonicalize_subject, EnsureOutcome, SubjectRegistry};

/// Upper bound on provider calls per tick.
pub const BACKFILL_BATCH: usize = 50;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub missing: usize,
    pub created: usize,
    pub failed: usize,
}

/// Subjects referenced by listings or profiles that have no stored embedding yet.
fn subjects_without_embedding(store: &Store) -> Result<Vec<String>, crate::store::StoreError> {
    let mut referenced = BTreeSet::new();
    for listing in store.list_listings(&Default::default(), usize::MAX, 0)? {
        referenced.extend(listing.subject_names().map(canonicalize_subject));
    }
    for user in store.list_users()? {
        referenced.extend(
            user.subjects_to_teach
                .iter()
                .chain(&user.subjects_to_learn)
                .map(|s| canonicalize_subject(s)),
        );
    }

    let mut missing = Vec::new();
    for name in referenced.into_iter().filter(|n| !n.is_empty()) {
        if !store.has_subject(&name)? {
            missing.push(name);
        }
    }
    Ok(missing)
}

pub async fn run(store: &Store, registry: &SubjectRegistry) -> BackfillReport {
    let missing = match subjects_without_embedding(store) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to scan subjects for embedding backfill");
            return BackfillReport::default();
        }
    };

    let mut report = BackfillReport {
        missing: missing.len(),
        ..BackfillReport::default()
    };
    if missing.is_empty() {
        return report;
    }

    for name in missing.iter().take(BACKFILL_BATCH) {
        match registry.ensure_embedded(name).await {
            Ok(EnsureOutcome::Created) => report.created += 1,
            Ok(EnsureOutcome::AlreadyPresent) => {}
            Err(e) => {
                report.failed += 1;
                tracing::warn!(subject = %name, error = %e, "Embedding backfill failed");
            }
        }
    }

    tracing::info!(
        missing = report.missing,
        created = report.created,
        failed = report.failed,
        "Embedding backfill finished"
    );
    report
}
