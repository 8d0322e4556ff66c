pub fn user_key(user_id: &str) -> String {
    user_id.to_string()
}

pub fn listing_key(listing_id: &str) -> String {
    listing_id.to_string()
}

pub fn listing_owner_index_key(user_id: &str, listing_id: &str) -> String {
    format!("{}:{}", user_id, listing_id)
}

pub fn listing_owner_prefix(user_id: &str) -> String {
    format!("{}:", user_id)
}

pub fn review_key(review_id: &str) -> String {
    review_id.to_string()
}

pub fn review_payment_index_key(payment_id: &str) -> String {
    payment_id.to_string()
}

pub fn payment_key(payment_id: &str) -> String {
    payment_id.to_string()
}

/// Subject rows are keyed by their canonical name, which keeps one row per subject.
pub fn subject_key(canonical_name: &str) -> String {
    canonical_name.to_string()
}

/// Extract the listing id from a `{user_id}:{listing_id}` owner index key.
pub fn listing_id_from_owner_key(key: &[u8]) -> Option<String> {
    let sep = key.iter().position(|b| *b == b':')?;
    let id = std::str::from_utf8(&key[sep + 1..]).ok()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_prefix_matches_index_key() {
        let key = listing_owner_index_key("u1", "l9");
        assert!(key.starts_with(&listing_owner_prefix("u1")));
        assert!(!key.starts_with(&listing_owner_prefix("u")));
    }

    #[test]
    fn listing_id_is_recovered_from_owner_key() {
        let key = listing_owner_index_key("u1", "l9");
        assert_eq!(listing_id_from_owner_key(key.as_bytes()).as_deref(), Some("l9"));
        assert_eq!(listing_id_from_owner_key(b"u1:"), None);
        assert_eq!(listing_id_from_owner_key(b"nosep"), None);
    }
}
