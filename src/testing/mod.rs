//! Test-only helpers shared by the integration suite under `tests/`.
//! Not part of the crate's public API surface a transport embedder
//! would use; kept behind this module so it compiles into the library
//! (tests live outside the crate and need access to it) without
//! leaking into `lib.rs`'s main re-exports.

pub mod pump;
