pub mod detector;
pub mod services;
pub mod sma;
pub mod window;
