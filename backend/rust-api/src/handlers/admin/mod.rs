//! Admin-only endpoints. The router puts `admin_guard_middleware` in front of all of them.

mod first_aid;
mod statistics;
mod users;

pub use first_aid::*;
pub use statistics::*;
pub use users::*;
