//! API request handlers

mod events;
mod health;
mod namespaces;
mod requests;

pub use events::*;
pub use health::*;
pub use namespaces::*;
pub use requests::*;
