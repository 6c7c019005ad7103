pub mod config;
pub mod plugin;
pub mod run;
