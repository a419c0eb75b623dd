pub mod client;
pub mod error;

pub use client::NodeClient;
pub use error::Error;
