mod helpers;
mod method;
mod rupiah;
mod txid;

pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use method::{MethodConversionError, MethodKind};
pub use rupiah::{Rupiah, RupiahConversionError, IDR_CURRENCY_CODE, IDR_CURRENCY_CODE_LOWER};
pub use secret::Secret;
pub use txid::TxId;
