#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod color;
mod json_ext;
mod sync;
pub mod text;

pub use color::Colors;
pub use color::init as color_init;
pub use color::is_disabled as color_is_disabled;
pub use json_ext::ValueExt;
pub use sync::lock_recoveries;
pub use sync::mutex_lock_or_recover;
