#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod commands;
pub mod console;
pub mod handlers;
pub mod signals;
pub mod telemetry;

pub use console::ConsoleChannel;
pub use handlers::HandlerContext;
pub use handlers::HandlerResult;
