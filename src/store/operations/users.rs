use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tutor,
    Tutee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tutor => "tutor",
            Self::Tutee => "tutee",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tutor" => Ok(Self::Tutor),
            "tutee" => Ok(Self::Tutee),
            other => Err(StoreError::Validation(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub role: Role,
    pub name: String,
    #[serde(default)]
    pub education_level: String,
    #[serde(default)]
    pub education_institute: String,
    #[serde(default)]
    pub achievements: String,
    #[serde(default)]
    pub subjects_to_teach: Vec<String>,
    #[serde(default)]
    pub subjects_to_learn: Vec<String>,
    #[serde(default)]
    pub teaching_level: Vec<String>,
    #[serde(default)]
    pub learning_level: Vec<String>,
    #[serde(default)]
    pub embedded_subject_to_teach: Option<Vec<f64>>,
    #[serde(default)]
    pub embedded_subject_to_learn: Option<Vec<f64>>,
    #[serde(default)]
    pub review_ids: Vec<String>,
    #[serde(default)]
    pub payment_ids: Vec<String>,
    #[serde(default)]
    pub reviewed_payment_ids: Vec<String>,
    #[serde(default)]
    pub personalised: bool,
    #[serde(default)]
    pub review_count: u64,
    #[serde(default)]
    pub total_rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: &str, role: Role, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            role,
            name: name.to_string(),
            education_level: String::new(),
            education_institute: String::new(),
            achievements: String::new(),
            subjects_to_teach: Vec::new(),
            subjects_to_learn: Vec::new(),
            teaching_level: Vec::new(),
            learning_level: Vec::new(),
            embedded_subject_to_teach: None,
            embedded_subject_to_learn: None,
            review_ids: Vec::new(),
            payment_ids: Vec::new(),
            reviewed_payment_ids: Vec::new(),
            personalised: false,
            review_count: 0,
            total_rating: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Average rating shown on profiles; zero when the user has no reviews.
    pub fn average_rating(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            self.total_rating / self.review_count as f64
        }
    }

    /// The embedding that represents the subjects this user cares about for their role.
    pub fn subject_embedding(&self) -> Option<&[f64]> {
        match self.role {
            Role::Tutor => self.embedded_subject_to_teach.as_deref(),
            Role::Tutee => self.embedded_subject_to_learn.as_deref(),
        }
    }

    pub fn has_reviewed_payment(&self, payment_id: &str) -> bool {
        self.reviewed_payment_ids.iter().any(|p| p == payment_id)
    }
}

impl Store {
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let key = keys::user_key(&user.id);
        let cas_result = self
            .users
            .compare_and_swap(
                key.as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(user)?),
            )
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "user".to_string(),
                key: user.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Self::get_doc(&self.users, &keys::user_key(user_id))
    }

    pub fn require_user(&self, user_id: &str) -> Result<User, StoreError> {
        self.get_user_by_id(user_id)?
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    /// Apply `mutate` to the stored user document with compare-and-swap.
    ///
    /// `mutate` runs again on a fresh copy whenever another writer got in first, so
    /// it must only touch the fields it owns.
    pub fn modify_user<F>(&self, user_id: &str, mut mutate: F) -> Result<User, StoreError>
    where
        F: FnMut(&mut User),
    {
        let key = keys::user_key(user_id);
        loop {
            let current = self
                .users
                .get(key.as_bytes())?
                .ok_or_else(|| StoreError::not_found("user", user_id))?;
            let mut user: User = Self::deserialize(&current)?;
            mutate(&mut user);
            user.updated_at = Utc::now();

            let swapped = self
                .users
                .compare_and_swap(key.as_bytes(), Some(current), Some(Self::serialize(&user)?))
                .map_err(StoreError::Sled)?;
            if swapped.is_ok() {
                return Ok(user);
            }
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        for item in self.users.iter() {
            let (_, v) = item?;
            users.push(Self::deserialize::<User>(&v)?);
        }
        Ok(users)
    }

    pub fn list_personalised_users(&self, role: Role) -> Result<Vec<User>, StoreError> {
        Ok(self
            .list_users()?
            .into_iter()
            .filter(|u| u.role == role && u.personalised)
            .collect())
    }
}
