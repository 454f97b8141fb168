//! Background services
//!
//! - **ServiceManager**: coordinates lifecycle and graceful shutdown of
//!   background services
//! - **CacheSweepService**: periodic local-cache sweep (expiry + eviction)

pub mod framework;
pub mod sweeper;

pub use framework::{Service, ServiceError, ServiceManager, ServiceStatus};
pub use sweeper::CacheSweepService;
