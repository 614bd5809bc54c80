pub mod args;
pub mod server;

pub use server::{Server, ServerConfig};
