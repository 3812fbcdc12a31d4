//! User accounts
//!
//! Registration creates an inactive account with an activation code;
//! only activated accounts authenticate. Password recovery issues a
//! single-use code.

mod store;
mod types;

pub use store::AccountRepository;
pub use types::{password_improvements, Account, AccountError, MIN_PASSWORD_LEN};
