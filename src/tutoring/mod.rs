//! Marketplace domain logic: subject embeddings, rating aggregates and profile
//! personalisation.

pub mod matching;
pub mod personalization;
pub mod rating;
pub mod subjects;
pub mod vector;
