//! logroll core library: rotation policy types, config loading, injected
//! clock and filesystem probe.
//!
//! - [`types`]: [`RotationConfig`], [`Compression`]
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / default locations
//! - [`clock`]: [`Clock`] and [`FsProbe`] capabilities

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, FileStat, FsProbe, ManualClock, OsFs, SystemClock};
pub use error::ConfigError;
pub use types::{Compression, RotationConfig};
