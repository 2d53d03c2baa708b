pub mod deployment;
pub mod device;
