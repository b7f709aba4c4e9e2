//! Database module for PostgreSQL persistence.

mod clients;
mod garments;
mod pool;
mod rentals;

pub use clients::*;
pub use garments::*;
pub use pool::*;
pub use rentals::*;
