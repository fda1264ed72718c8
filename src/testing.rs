//! In-process emulation of the compute module for tests.
//!
//! [`MockModule`] implements [`ModuleExports`] without a wasm runtime: a
//! `Vec<u8>` stands in for linear memory, a bump allocator with
//! live-allocation accounting stands in for the guest allocator, and the
//! codec itself is `flate2`. Tests drive the exact same staging, sentinel,
//! and error-channel protocol as the production path, and can additionally
//! assert on allocator state via [`MockModule::outstanding`].

use crate::error::{GzipError, Result};
use crate::module::{ModuleExports, ERROR_SENTINEL};
use crate::options::{CompressFlags, DecompressFlags};
use crate::types::{ArenaPtr, BufferPtr};
use flate2::read::{GzDecoder, MultiGzDecoder};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{Read, Write};

/// An emulated gzip compute module.
pub struct MockModule {
    memory: Vec<u8>,
    /// Outstanding host-owned allocations, by address.
    live: HashMap<u32, u32>,
    /// Current shared output buffer (address, length).
    buffer: (u32, u32),
    /// Pending error message (address, length).
    error: (u32, u32),
}

impl MockModule {
    /// Create an emulated module with empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Address zero stays unmapped, as with the real allocator.
            memory: vec![0; 16],
            live: HashMap::new(),
            buffer: (0, 0),
            error: (0, 0),
        }
    }

    /// Number of host-owned allocations not yet freed.
    ///
    /// Zero after any well-behaved operation: the protocol frees staged
    /// input immediately after the boundary call that consumed it.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    /// Append a region to "linear memory" and return its address.
    fn reserve(&mut self, len: u32) -> u32 {
        let ptr = self.memory.len() as u32;
        // Zero-sized allocations still get a distinct address.
        self.memory
            .resize(self.memory.len() + (len.max(1)) as usize, 0);
        ptr
    }

    fn read_input(&self, ptr: ArenaPtr, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let offset = ptr.as_u32() as usize;
        self.memory
            .get(offset..offset + len as usize)
            .map(|data| data.to_vec())
            .ok_or(GzipError::MemoryAccess {
                offset: ptr.as_u32(),
                len,
            })
    }

    fn set_output(&mut self, data: &[u8]) -> u32 {
        let len = data.len() as u32;
        let ptr = self.reserve(len);
        self.memory[ptr as usize..ptr as usize + data.len()].copy_from_slice(data);
        self.buffer = (ptr, len);
        len
    }

    fn set_error(&mut self, message: &str) {
        let bytes = message.as_bytes();
        let ptr = self.reserve(bytes.len() as u32);
        self.memory[ptr as usize..ptr as usize + bytes.len()].copy_from_slice(bytes);
        self.error = (ptr, bytes.len() as u32);
    }
}

impl Default for MockModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleExports for MockModule {
    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn buffer(&mut self) -> Result<BufferPtr> {
        Ok(BufferPtr::new(self.buffer.0))
    }

    fn error_message(&mut self) -> Result<BufferPtr> {
        Ok(BufferPtr::new(self.error.0))
    }

    fn error_message_len(&mut self) -> Result<u32> {
        Ok(self.error.1)
    }

    fn malloc_u8(&mut self, len: u32) -> Result<ArenaPtr> {
        let ptr = self.reserve(len);
        self.live.insert(ptr, len);
        Ok(ArenaPtr::new(ptr))
    }

    fn free_u8(&mut self, ptr: ArenaPtr, len: u32) -> Result<()> {
        // Stricter than the real allocator: double frees and length
        // mismatches fail loudly so protocol bugs surface in tests.
        match self.live.remove(&ptr.as_u32()) {
            Some(allocated) if allocated == len => Ok(()),
            Some(allocated) => Err(GzipError::Boundary {
                function: "free_u8",
                cause: format!("length mismatch: allocated {allocated}, freed {len}"),
            }),
            None => Err(GzipError::Boundary {
                function: "free_u8",
                cause: format!("free of unknown address {ptr}"),
            }),
        }
    }

    fn deallocate_buffer(&mut self) -> Result<()> {
        self.buffer = (0, 0);
        Ok(())
    }

    fn gzip_compress(&mut self, input: ArenaPtr, len: u32, flags: u32) -> Result<u32> {
        let data = self.read_input(input, len)?;

        let flags = CompressFlags::from_bits_truncate(flags);
        // flate2 has no fixed-Huffman-only mode; that switch is accepted
        // and ignored by the emulation.
        let level = if flags.contains(CompressFlags::NO_COMPRESSION) {
            Compression::none()
        } else {
            Compression::default()
        };

        let mut encoder = GzEncoder::new(Vec::new(), level);
        let encoded = encoder
            .write_all(&data)
            .and_then(|()| encoder.finish())
            .map_err(|e| GzipError::Boundary {
                function: "gzip_compress",
                cause: e.to_string(),
            })?;

        Ok(self.set_output(&encoded))
    }

    fn gzip_decompress(&mut self, input: ArenaPtr, len: u32, flags: u32) -> Result<u32> {
        let data = self.read_input(input, len)?;

        let flags = DecompressFlags::from_bits_truncate(flags);
        let mut decoded = Vec::new();
        let result = if flags.contains(DecompressFlags::MULTI) {
            MultiGzDecoder::new(data.as_slice()).read_to_end(&mut decoded)
        } else {
            GzDecoder::new(data.as_slice()).read_to_end(&mut decoded)
        };

        match result {
            Ok(_) => Ok(self.set_output(&decoded)),
            Err(e) => {
                self.set_error(&e.to_string());
                Ok(ERROR_SENTINEL)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_tracks_live_allocations() {
        let mut module = MockModule::new();
        let a = module.malloc_u8(4).unwrap();
        let b = module.malloc_u8(8).unwrap();
        assert_ne!(a, b);
        assert_eq!(module.outstanding(), 2);

        module.free_u8(a, 4).unwrap();
        assert_eq!(module.outstanding(), 1);

        // Double free is rejected.
        assert!(module.free_u8(a, 4).is_err());
        module.free_u8(b, 8).unwrap();
    }

    #[test]
    fn decode_failure_stages_an_error_message() {
        let mut module = MockModule::new();
        let ptr = module.malloc_u8(3).unwrap();
        let offset = ptr.as_u32() as usize;
        module.memory_mut()[offset..offset + 3].copy_from_slice(&[42, 0, 7]);

        let len = module.gzip_decompress(ptr, 3, 0).unwrap();
        assert_eq!(len, ERROR_SENTINEL);
        assert!(module.error_message_len().unwrap() > 0);
        module.free_u8(ptr, 3).unwrap();
    }
}
