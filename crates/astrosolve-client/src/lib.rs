//! Astrosolve client
//!
//! HTTP implementation of [`astrosolve_interfaces::AstrometryGateway`] for the
//! astrometry.net JSON API, plus the configuration the command-line runner
//! reads from the environment.

pub mod config;
pub mod remote_gateway;

pub use config::{ClientConfig, ConfigError};
pub use remote_gateway::{NovaGateway, NovaGatewayConfig};
