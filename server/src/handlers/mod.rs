//! Request handlers: the ledger logic behind the HTTP routes.

mod clients;
mod garments;
mod rentals;

pub use clients::*;
pub use garments::*;
pub use rentals::*;
