pub mod db;
pub mod lease;
pub mod repositories;
