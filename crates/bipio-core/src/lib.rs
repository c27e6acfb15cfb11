//! # bipio-core
//!
//! Core types for the bipio byte-stream engine.
//!
//! This crate is platform-agnostic and performs no system calls.
//! Everything that touches a descriptor lives in `bipio-runtime`.
//!
//! ## Modules
//!
//! - `bip` - Bip buffer: circular storage handing out contiguous windows
//! - `flags` - Stream capability bitset
//! - `error` - Error types
//! - `backing` - Handle type and the resource-release trait
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod bip;
pub mod flags;
pub mod error;
pub mod backing;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use bip::BipBuffer;
pub use flags::StreamFlags;
pub use error::{
    ConfigError, Operation, SetupError, SetupResult, StreamError, StreamResult,
};
pub use backing::{Backing, RawHandle, INVALID_HANDLE};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Constants shared by the engine
pub mod constants {
    /// Buffer size used when the host asks for 0
    pub const DEFAULT_BUF_SIZE: usize = 4096;

    /// Smallest usable buffer: one data byte plus the sentinel byte
    pub const MIN_BUF_SIZE: usize = 2;

    /// Largest buffer (cursors are tracked as `u32` on the wire of the host API)
    pub const MAX_BUF_SIZE: usize = u32::MAX as usize;

    /// Listen backlog used when the host does not pass one
    pub const DEFAULT_BACKLOG: i32 = 50;

    /// Index of the inbound buffer
    pub const INBOUND: usize = 0;

    /// Index of the outbound buffer (present only for writable streams)
    pub const OUTBOUND: usize = 1;
}
