pub const USERS: &str = "users";
pub const LISTINGS: &str = "listings";
pub const REVIEWS: &str = "reviews";
pub const PAYMENTS: &str = "payments";
pub const SUBJECTS: &str = "subjects";
pub const META: &str = "meta";

// Secondary index trees
pub const LISTINGS_BY_OWNER: &str = "listings_by_owner";
pub const REVIEWS_BY_PAYMENT: &str = "reviews_by_payment";
