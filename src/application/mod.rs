pub mod bootstrap;
pub mod commands;
pub mod statistics;
pub mod timer_driver;
