//! Primitives shared by every crate in the Duka workspace.
mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, KES_CURRENCY_CODE};
pub use secret::Secret;
