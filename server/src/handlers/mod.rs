//! Request handlers for the sync API.

mod conflicts;
mod operations;
mod remote;

pub use conflicts::*;
pub use operations::*;
pub use remote::*;
