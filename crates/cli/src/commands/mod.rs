pub mod budget;
pub mod config_cmd;
pub mod knowledge;
pub mod memory;
pub mod onboard;
