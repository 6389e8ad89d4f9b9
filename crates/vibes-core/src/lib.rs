//! Pure transformation from engine output lines to renderable segments.
//!
//! Nothing in this crate performs I/O: the daemon feeds it lines read from
//! a process (or replayed from a log file) and gets back [`Segment`]s plus
//! the side-channel signals described on [`Normalized`].

#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod engine;
pub mod event;
mod normalizer;
mod segment;
pub mod token;
pub mod transcript;

pub use engine::Engine;
pub use engine::UnknownEngine;
pub use event::CommandExecution;
pub use event::DecodedLine;
pub use event::EngineEvent;
pub use normalizer::Normalized;
pub use normalizer::Normalizer;
pub use segment::Segment;
pub use segment::SegmentKind;

/// Cap for command output and tool payloads.
pub const TOOL_OUTPUT_LIMIT: usize = 2000;
/// Cap for diff payloads.
pub const DIFF_LIMIT: usize = 2500;
