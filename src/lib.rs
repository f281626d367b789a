pub mod data;
pub mod mirror;
pub mod orders;
