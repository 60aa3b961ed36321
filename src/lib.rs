pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod feedback;
pub mod phonetic;
pub mod session;
pub mod state;
pub mod switcher;
pub mod transcript;
