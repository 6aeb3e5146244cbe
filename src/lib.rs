pub mod change_detector;
pub mod client;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod health;
pub mod logging;
pub mod ot;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;
