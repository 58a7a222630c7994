mod helpers;
mod money;

pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use money::{Money, MoneyConversionError, MAX_PAYMENT_AMOUNT, MIN_PAYMENT_AMOUNT};
pub use secret::Secret;
