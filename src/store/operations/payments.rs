use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    /// Display name of the tutor receiving the payment.
    pub paid_to: String,
    /// Display name of the tutee paying for the lesson.
    pub paid_by: String,
    pub tutor_id: String,
    pub tutee_id: String,
    pub subject: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub cost_per_hour: f64,
    pub total_cost: f64,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lesson cost for the slot `[start, end)`, rounded to cents.
pub fn lesson_cost(start: NaiveTime, end: NaiveTime, cost_per_hour: f64) -> Option<f64> {
    if end <= start || !cost_per_hour.is_finite() || cost_per_hour < 0.0 {
        return None;
    }
    let minutes = (end - start).num_minutes() as f64;
    Some((cost_per_hour * minutes / 60.0 * 100.0).round() / 100.0)
}

impl Store {
    pub fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let key = keys::payment_key(&payment.id);
        let cas_result = self
            .payments
            .compare_and_swap(
                key.as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(payment)?),
            )
            .map_err(StoreError::Sled)?;
        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "payment".to_string(),
                key: payment.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>, StoreError> {
        Self::get_doc(&self.payments, &keys::payment_key(payment_id))
    }

    pub fn mark_payment_paid(&self, payment_id: &str) -> Result<Payment, StoreError> {
        let mut payment = self
            .get_payment(payment_id)?
            .ok_or_else(|| StoreError::not_found("payment", payment_id))?;
        payment.is_paid = true;
        payment.updated_at = Utc::now();
        Self::put_doc(&self.payments, &keys::payment_key(payment_id), &payment)?;
        Ok(payment)
    }

    pub fn get_payments(&self, payment_ids: &[String]) -> Result<Vec<Payment>, StoreError> {
        let mut payments = Vec::with_capacity(payment_ids.len());
        for id in payment_ids {
            if let Some(payment) = self.get_payment(id)? {
                payments.push(payment);
            }
        }
        payments.sort_by(|a, b| (b.date, b.start_time).cmp(&(a.date, a.start_time)));
        Ok(payments)
    }
}
