use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Human legible order number, `ORD-YYYYMMDD-XXXXXXXX`, where the suffix is
/// eight random uppercase hex digits.
pub fn generate_order_number(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{suffix}", at.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn number_has_date_and_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let number = generate_order_number(at);

        assert_eq!(number.len(), "ORD-20260307-".len() + 8);
        assert!(number.starts_with("ORD-20260307-"));
        let suffix = &number["ORD-20260307-".len()..];
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn numbers_differ() {
        let at = Utc::now();
        assert_ne!(generate_order_number(at), generate_order_number(at));
    }
}
