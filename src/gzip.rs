//! The compression service: `compress`, `decompress`, `free_buffer`.
//!
//! Composes the arena bridge, the option encoder, and the error channel
//! around the module's two codec exports. Results come back as
//! [`GzipOutput`], a view over the module's shared output buffer rather
//! than a copy: the buffer is a single slot the module reuses on every
//! operation, so a view is only valid until the next boundary call. The
//! view borrows the handle that produced it, which lets the borrow checker
//! reject any use of a stale view at compile time; call
//! [`GzipOutput::to_vec`] first when the data has to outlive the next call.

use crate::error::{GzipError, Result};
use crate::memory::{self, ByteSource};
use crate::module::{ModuleExports, WasmExports, ERROR_SENTINEL};
use crate::options::{CompressionOptions, DecompressionOptions};
use std::fmt;
use std::ops::Deref;

/// Handle to a loaded gzip compute module.
///
/// Created by the [`Loader`](crate::loader::Loader) for the wasmtime-backed
/// surface, or directly from any [`ModuleExports`] implementor. All
/// operations take `&mut self`; boundary calls are strictly sequential.
pub struct GzipModule<E = WasmExports> {
    exports: E,
}

impl<E> fmt::Debug for GzipModule<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipModule").finish_non_exhaustive()
    }
}

impl<E: ModuleExports> GzipModule<E> {
    /// Wrap an export surface in a service handle.
    pub fn new(exports: E) -> Self {
        Self { exports }
    }

    /// Compress an input and return a view of the gzip member.
    ///
    /// The input may be a byte slice, a string (encoded as UTF-8), or a
    /// [`ByteSource::fill`] initializer writing directly into module memory.
    /// Compression cannot fail on malformed input — any byte sequence is
    /// compressible — so the only failures here are boundary-level ones.
    ///
    /// The returned view is only valid until the next call on this handle.
    pub fn compress<'m, 'a>(
        &'m mut self,
        source: impl Into<ByteSource<'a>>,
        options: &CompressionOptions,
    ) -> Result<GzipOutput<'m, E>> {
        let staged = memory::stage(&mut self.exports, source.into())?;
        let flags = options.flags().bits();

        let call = self
            .exports
            .gzip_compress(staged.ptr, staged.len, flags);
        // The staged input is dead after the call, whatever its outcome.
        // A call error takes precedence over a free error.
        let freed = self.exports.free_u8(staged.ptr, staged.len);
        let out_len = call?;
        freed?;

        tracing::debug!(input = staged.len, output = out_len, "compressed");
        self.output(out_len)
    }

    /// Decompress an input and return a view of the raw bytes.
    ///
    /// With [`DecompressionOptions::multi`] set, every gzip member in the
    /// input is decoded and the payloads are concatenated; otherwise only
    /// the first member is decoded.
    ///
    /// Fails with [`GzipError::Decoding`] when the module rejects the input;
    /// the error carries the message recovered from the module's error
    /// channel. The returned view is only valid until the next call on this
    /// handle.
    pub fn decompress<'m, 'a>(
        &'m mut self,
        source: impl Into<ByteSource<'a>>,
        options: &DecompressionOptions,
    ) -> Result<GzipOutput<'m, E>> {
        let staged = memory::stage(&mut self.exports, source.into())?;
        let flags = options.flags().bits();

        let call = self
            .exports
            .gzip_decompress(staged.ptr, staged.len, flags);
        let freed = self.exports.free_u8(staged.ptr, staged.len);
        let out_len = call?;
        freed?;

        if out_len == ERROR_SENTINEL {
            // The message region obeys the same reuse-on-next-call rule as
            // the output buffer, so it must be read before anything else
            // crosses the boundary.
            let message = memory::read_error_message(&mut self.exports)?;
            tracing::debug!(input = staged.len, %message, "decompression rejected");
            return Err(GzipError::Decoding { message });
        }

        tracing::debug!(input = staged.len, output = out_len, "decompressed");
        self.output(out_len)
    }

    /// Release the shared output buffer early.
    ///
    /// Purely an optimization to bound module memory between operations;
    /// never required for correctness.
    pub fn free_buffer(&mut self) -> Result<()> {
        self.exports.deallocate_buffer()
    }

    /// Read-only access to the underlying export surface.
    pub fn exports(&self) -> &E {
        &self.exports
    }

    /// Build a validated view over the shared output buffer.
    fn output(&mut self, len: u32) -> Result<GzipOutput<'_, E>> {
        let ptr = self.exports.buffer()?;
        // Validate the range once so the view can deref infallibly.
        memory::slice(&self.exports, ptr, len)?;
        Ok(GzipOutput {
            module: &self.exports,
            offset: ptr.as_u32() as usize,
            len: len as usize,
        })
    }
}

/// A view over the module's shared output buffer.
///
/// Derefs to `&[u8]`. The underlying region belongs to the module and is
/// reused by the next compress/decompress/free call; the view's borrow on
/// the handle makes such a call impossible while the view is alive. Use
/// [`GzipOutput::to_vec`] to copy the bytes out first.
pub struct GzipOutput<'m, E: ModuleExports> {
    module: &'m E,
    offset: usize,
    len: usize,
}

impl<E: ModuleExports> GzipOutput<'_, E> {
    /// The view as a byte slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        &self.module.memory()[self.offset..self.offset + self.len]
    }

    /// Copy the bytes out of module memory.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Decode the result as UTF-8 text, substituting invalid sequences.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_slice()).into_owned()
    }

    /// Length of the result in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the result is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<E: ModuleExports> Deref for GzipOutput<'_, E> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<E: ModuleExports> AsRef<[u8]> for GzipOutput<'_, E> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<E: ModuleExports> fmt::Debug for GzipOutput<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipOutput")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}
