pub mod schema;

pub use schema::{Config, DatabaseConfig, GatewayConfig, LlmConfig};
