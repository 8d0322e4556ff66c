use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::operations::users::Role;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub name: String,
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub tutor_count: u64,
    #[serde(default)]
    pub tutee_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Insert a subject row unless one already exists for the name.
    /// Returns `false` when another writer got there first.
    pub fn insert_subject_if_absent(&self, row: &SubjectRow) -> Result<bool, StoreError> {
        let key = keys::subject_key(&row.name);
        let cas_result = self
            .subjects
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(Self::serialize(row)?))
            .map_err(StoreError::Sled)?;
        Ok(cas_result.is_ok())
    }

    pub fn get_subject(&self, name: &str) -> Result<Option<SubjectRow>, StoreError> {
        Self::get_doc(&self.subjects, &keys::subject_key(name))
    }

    pub fn has_subject(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.subjects.contains_key(keys::subject_key(name).as_bytes())?)
    }

    /// Increment the usage counter for `role` on an existing subject row.
    pub fn increment_subject_count(&self, name: &str, role: Role) -> Result<(), StoreError> {
        let key = keys::subject_key(name);
        loop {
            let current = self
                .subjects
                .get(key.as_bytes())?
                .ok_or_else(|| StoreError::not_found("subject", name))?;
            let mut row: SubjectRow = Self::deserialize(&current)?;
            match role {
                Role::Tutor => row.tutor_count += 1,
                Role::Tutee => row.tutee_count += 1,
            }
            row.updated_at = Utc::now();

            let swapped = self
                .subjects
                .compare_and_swap(key.as_bytes(), Some(current), Some(Self::serialize(&row)?))
                .map_err(StoreError::Sled)?;
            if swapped.is_ok() {
                return Ok(());
            }
        }
    }

    pub fn list_subjects(&self) -> Result<Vec<SubjectRow>, StoreError> {
        let mut rows = Vec::new();
        for item in self.subjects.iter() {
            let (_, v) = item?;
            rows.push(Self::deserialize::<SubjectRow>(&v)?);
        }
        Ok(rows)
    }
}
