mod money;

pub mod op;

pub use money::{Money, MoneyParseError, DEFAULT_CURRENCY};
