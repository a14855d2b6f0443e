pub mod config;
pub mod error;
pub mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::GatewayServer;
