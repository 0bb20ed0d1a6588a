use chrono::Utc;
use rand::Rng;

use crate::db_types::OrderNumber;

/// Generate a new externally visible order number.
///
/// The format is `ORD{unix_millis}{nnn}` with a random 3-digit suffix. Uniqueness is ultimately enforced by the
/// database constraint on the order number column; the suffix keeps collisions between same-millisecond orders rare
/// enough that retrying is never needed in practice.
pub fn new_order_number() -> OrderNumber {
    let millis = Utc::now().timestamp_millis();
    let suffix = rand::thread_rng().gen_range(0..1000);
    OrderNumber(format!("ORD{millis}{suffix:03}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_number_shape() {
        let n = new_order_number();
        assert!(n.as_str().starts_with("ORD"));
        assert!(n.as_str()[3..].chars().all(|c| c.is_ascii_digit()));
        // millis (13 digits for the foreseeable future) + 3-digit suffix
        assert_eq!(n.as_str().len(), 3 + 13 + 3);
    }

    #[test]
    fn order_numbers_differ() {
        let numbers: std::collections::HashSet<_> =
            (0..50).map(|_| new_order_number().0).collect();
        assert!(numbers.len() > 1);
    }
}
