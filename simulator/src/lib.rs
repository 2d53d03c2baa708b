pub mod backend;
pub mod cli;
pub mod config;
pub mod device;
pub mod fleet;
pub mod identity;
pub mod observe;
pub mod profiles;
pub mod shutdown;
pub mod store;
