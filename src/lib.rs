pub mod actuator;
pub mod config;
pub mod console;
pub mod control;
pub mod messages;
pub mod operator;
pub mod runtime;
pub mod scheduler;
pub mod state;
