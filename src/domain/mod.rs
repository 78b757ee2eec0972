mod identity;
mod integrity;
mod ledger;
mod rating;
mod user;

pub use identity::*;
pub use integrity::*;
pub use ledger::*;
pub use rating::*;
pub use user::*;
