pub mod listings;
pub mod payments;
pub mod reviews;
pub mod subjects;
pub mod users;
