//! Host-side bridge for a WebAssembly gzip compute module.
//!
//! The compute module performs the actual gzip compression and
//! decompression inside its own linear memory; this crate owns everything
//! needed to drive it safely from the host:
//!
//! - **Loader**: one-time, possibly-racing initialization from bytes, a
//!   file, a URL, an in-flight response, or a precompiled module, with a
//!   suspending and a non-suspending entry point
//! - **Arena staging**: copying bytes or UTF-8 text into module memory, or
//!   filling freshly allocated module memory in place (zero-copy)
//! - **Option encoding**: per-operation bit-packed flag words
//! - **Result views**: borrow-checked views over the module's single shared
//!   output buffer, which is reused (not copied) between calls
//! - **Error channel**: recovery of module-staged error messages when an
//!   operation signals failure through the sentinel return value
//!
//! # Example
//!
//! ```no_run
//! use wasm_gzip::{CompressionOptions, DecompressionOptions, Loader};
//!
//! # async fn example() -> wasm_gzip::Result<()> {
//! let loader = Loader::new();
//! let module = loader.init_default().await?;
//!
//! let mut gzip = module.lock();
//! let compressed = gzip.compress("Hello, World!", &CompressionOptions::new())?.to_vec();
//! let original = gzip.decompress(&compressed[..], &DecompressionOptions::new())?;
//! assert_eq!(&*original, b"Hello, World!");
//! # Ok(())
//! # }
//! ```
//!
//! The value returned by [`GzipModule::compress`] and
//! [`GzipModule::decompress`] is a *view* into module memory, valid only
//! until the next call on the same handle; the borrow checker enforces
//! this, and [`GzipOutput::to_vec`] copies the bytes out when they need to
//! survive longer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gzip;
pub mod loader;
pub mod memory;
pub mod module;
pub mod options;
pub mod testing;
pub mod types;

pub use error::{GzipError, Result};
pub use gzip::{GzipModule, GzipOutput};
pub use loader::{Loader, ModuleSource, SharedModule, SyncModuleSource};
pub use memory::ByteSource;
pub use options::{CompressionOptions, DecompressionOptions};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{GzipError, Result};
    pub use crate::gzip::{GzipModule, GzipOutput};
    pub use crate::loader::{Loader, ModuleSource, SharedModule, SyncModuleSource};
    pub use crate::memory::ByteSource;
    pub use crate::module::{ModuleExports, WasmExports, ERROR_SENTINEL};
    pub use crate::options::{CompressionOptions, DecompressionOptions};
    pub use crate::types::{ArenaPtr, BufferPtr};
}
