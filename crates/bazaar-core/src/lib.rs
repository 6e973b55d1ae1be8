pub mod accounts;
mod app_config;
pub mod catalog;
pub mod commerce;
mod config;
pub mod content;
mod error;
pub mod memory;
pub mod otp;
pub mod services;
pub mod store;
pub mod tokens;
pub mod variants;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{AuthError, ConfigError, ServiceError, StoreError, ValidationError, VariantError};
pub use services::Services;
pub use store::Store;
pub use tokens::{Claims, TokenKind, TokenPair, TokenService};
