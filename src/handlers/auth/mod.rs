pub mod login;
pub mod session;

pub use login::{callback, login_redirect};
pub use session::{logout, me};
