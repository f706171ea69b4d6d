mod money;

pub mod op;
mod secret;

mod helpers;

pub use helpers::parse_boolean_flag;
pub use money::{Cents, CentsConversionError, STORE_CURRENCY_CODE, STORE_CURRENCY_CODE_LOWER};
pub use secret::Secret;
