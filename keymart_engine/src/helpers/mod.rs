//! Small utilities that don't belong to any one subsystem.

mod order_number;

pub use order_number::new_order_number;
