mod signature;
mod trade_no;

pub use signature::{canonical_query, generate_sign, validate_signature, SIGN_TYPE};
pub use trade_no::{new_trade_no, trade_no_at};
