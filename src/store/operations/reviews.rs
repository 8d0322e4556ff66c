use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::users::User;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub tutee_name: String,
    #[serde(default)]
    pub tutee_id: String,
    #[serde(default)]
    pub tutor_id: String,
    #[serde(default)]
    pub review_text: String,
    /// Rating in its stored string form; parsed when aggregating.
    pub ratings: String,
    pub payment_id: String,
    pub created_at: DateTime<Utc>,
}

fn load_user_in_tx(
    users: &TransactionalTree,
    user_id: &str,
) -> Result<User, ConflictableTransactionError<StoreError>> {
    let raw = users
        .get(keys::user_key(user_id).as_bytes())?
        .ok_or_else(|| ConflictableTransactionError::Abort(StoreError::not_found("user", user_id)))?;
    Store::deserialize(&raw).map_err(ConflictableTransactionError::Abort)
}

impl Store {
    /// Persist a review together with its references in one transaction: the
    /// payment index claim, the review id on the tutor and the payment id on the
    /// tutee's reviewed list. A payment can be referenced by at most one review.
    pub fn create_review(&self, review: &Review) -> Result<(), StoreError> {
        let index_key = keys::review_payment_index_key(&review.payment_id);
        let review_key = keys::review_key(&review.id);
        let review_bytes = Self::serialize(review)?;

        (&self.reviews, &self.reviews_by_payment, &self.users)
            .transaction(|(reviews, by_payment, users)| {
                if by_payment.get(index_key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict {
                        entity: "review_payment".to_string(),
                        key: review.payment_id.clone(),
                    }));
                }

                let now = Utc::now();
                let mut tutor = load_user_in_tx(users, &review.tutor_id)?;
                let mut tutee = load_user_in_tx(users, &review.tutee_id)?;
                tutor.review_ids.push(review.id.clone());
                tutor.updated_at = now;
                tutee.reviewed_payment_ids.push(review.payment_id.clone());
                tutee.updated_at = now;

                let tutor_bytes = Self::serialize(&tutor).map_err(ConflictableTransactionError::Abort)?;
                let tutee_bytes = Self::serialize(&tutee).map_err(ConflictableTransactionError::Abort)?;

                by_payment.insert(index_key.as_bytes(), review.id.as_bytes())?;
                reviews.insert(review_key.as_bytes(), review_bytes.as_slice())?;
                users.insert(keys::user_key(&tutor.id).as_bytes(), tutor_bytes)?;
                users.insert(keys::user_key(&tutee.id).as_bytes(), tutee_bytes)?;
                Ok(())
            })
            .map_err(|e: TransactionError<StoreError>| match e {
                TransactionError::Abort(inner) => inner,
                TransactionError::Storage(se) => StoreError::Sled(se),
            })
    }

    pub fn get_review(&self, review_id: &str) -> Result<Option<Review>, StoreError> {
        Self::get_doc(&self.reviews, &keys::review_key(review_id))
    }

    pub fn review_id_for_payment(&self, payment_id: &str) -> Result<Option<String>, StoreError> {
        let key = keys::review_payment_index_key(payment_id);
        Ok(self
            .reviews_by_payment
            .get(key.as_bytes())?
            .and_then(|raw| String::from_utf8(raw.to_vec()).ok()))
    }

    /// Load the given reviews in order, skipping ids that no longer resolve.
    pub fn get_reviews(&self, review_ids: &[String]) -> Result<Vec<Review>, StoreError> {
        let mut reviews = Vec::with_capacity(review_ids.len());
        for id in review_ids {
            if let Some(review) = self.get_review(id)? {
                reviews.push(review);
            }
        }
        Ok(reviews)
    }
}
