pub mod exchange;
pub mod remote;
pub mod services;
