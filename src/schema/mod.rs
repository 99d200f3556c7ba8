//! Wire types for the subset of the Model Context Protocol this client speaks.

pub mod jsonrpc;
pub(crate) mod requests;

mod content;
mod initialization;
mod prompts;
mod resources;
mod tools;

pub use content::*;
pub use initialization::*;
pub use jsonrpc::*;
pub use prompts::*;
pub use resources::*;
pub use tools::*;
