// bruh-bot: an autonomous posting agent.
//
// This is the library root. The scheduler drives everything; generator,
// history and transport are the seams it is built from.

pub mod config;
pub mod generator;
pub mod history;
pub mod scheduler;
pub mod status;
pub mod topics;
pub mod transport;
