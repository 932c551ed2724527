pub mod commands;
pub mod repos;
