/// Input checks shared by the profile, listing, payment and review routes.
/// Each returns a caller-facing message on failure.

pub const MAX_NAME_CHARS: usize = 80;
pub const MAX_TEXT_CHARS: usize = 2000;

/// Display names: 1-80 characters after trimming.
pub fn validate_display_name(name: &str) -> Result<(), &'static str> {
    let count = name.trim().chars().count();
    if count == 0 {
        return Err("name must not be empty");
    }
    if count > MAX_NAME_CHARS {
        return Err("name must be at most 80 characters");
    }
    Ok(())
}

pub fn validate_free_text(text: &str) -> Result<(), &'static str> {
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err("text must be at most 2000 characters");
    }
    Ok(())
}

/// A listing carries either one fixed price or a `start..=end` range. Every
/// supplied value must be finite and non-negative.
pub fn validate_listing_price(
    price: Option<f64>,
    start_price: Option<f64>,
    end_price: Option<f64>,
) -> Result<(), &'static str> {
    for value in [price, start_price, end_price].into_iter().flatten() {
        if !value.is_finite() || value < 0.0 {
            return Err("prices must be non-negative numbers");
        }
    }
    match (price, start_price, end_price) {
        (Some(_), None, None) => Ok(()),
        (None, Some(start), Some(end)) if start <= end => Ok(()),
        (None, Some(_), Some(_)) => Err("startPrice must not exceed endPrice"),
        (None, None, None) => Err("either price or startPrice and endPrice is required"),
        _ => Err("use either price or a startPrice/endPrice range, not both"),
    }
}

pub fn validate_subject_count(count: usize, max: usize) -> Result<(), &'static str> {
    if count == 0 {
        return Err("at least one subject is required");
    }
    if count > max {
        return Err("too many subjects in one request");
    }
    Ok(())
}

pub fn validate_hourly_rate(rate: f64) -> Result<(), &'static str> {
    if !rate.is_finite() || rate < 0.0 {
        return Err("costPerHour must be a non-negative number");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_bounds() {
        assert!(validate_display_name("Alice").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(81)).is_err());
        assert!(validate_display_name(&"é".repeat(80)).is_ok());
    }

    #[test]
    fn price_shapes() {
        assert!(validate_listing_price(Some(40.0), None, None).is_ok());
        assert!(validate_listing_price(None, Some(30.0), Some(50.0)).is_ok());
        assert!(validate_listing_price(None, Some(30.0), Some(30.0)).is_ok());
        assert!(validate_listing_price(None, Some(60.0), Some(50.0)).is_err());
        assert!(validate_listing_price(None, None, None).is_err());
        assert!(validate_listing_price(Some(40.0), Some(30.0), Some(50.0)).is_err());
        assert!(validate_listing_price(None, Some(30.0), None).is_err());
        assert!(validate_listing_price(Some(-1.0), None, None).is_err());
        assert!(validate_listing_price(Some(f64::NAN), None, None).is_err());
    }

    #[test]
    fn subject_count_bounds() {
        assert!(validate_subject_count(0, 20).is_err());
        assert!(validate_subject_count(1, 20).is_ok());
        assert!(validate_subject_count(21, 20).is_err());
    }

    #[test]
    fn text_and_rate() {
        assert!(validate_free_text("good tutor").is_ok());
        assert!(validate_free_text(&"a".repeat(2001)).is_err());
        assert!(validate_hourly_rate(25.0).is_ok());
        assert!(validate_hourly_rate(-5.0).is_err());
        assert!(validate_hourly_rate(f64::INFINITY).is_err());
    }
}
