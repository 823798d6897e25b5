// Library crate for the lock value block cache: the lvbcache binary and the
// integration tests reuse these modules.

pub mod accounting;
pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod lvb;
pub mod namespace;
pub mod resource;

pub use error::LvbError;
pub use filter::{FilterLvb, LvbOps, UpdateOutcome};
pub use lvb::{Lvb, LvbStatus};
pub use resource::{LockResource, ResId};
