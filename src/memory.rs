//! Arena staging: moving input bytes into the module's linear memory.
//!
//! The compute module cannot see host memory, so every input crosses the
//! boundary through its exported allocator: allocate, copy (or fill) into
//! the allocation, hand the address and length to the codec, free. The three
//! staging shapes mirror the three ways callers hold data: a byte slice, a
//! text string (Rust strings are UTF-8, so the exact encoded length is
//! simply `str::len`), or a declared length plus an initializer that writes
//! straight into module memory without an intermediate host buffer.

use crate::error::{GzipError, Result};
use crate::module::ModuleExports;
use crate::types::{ArenaPtr, BufferPtr};
use std::borrow::Cow;
use std::fmt;

/// Initializer for the zero-copy staging path.
pub type FillFn<'a> = Box<dyn FnOnce(&mut [u8]) -> Result<()> + 'a>;

/// An input buffer to be staged into module memory.
pub enum ByteSource<'a> {
    /// Already-materialized bytes, copied into the allocation.
    Bytes(Cow<'a, [u8]>),
    /// Text, encoded as UTF-8 directly into the allocation.
    Text(Cow<'a, str>),
    /// A declared length plus an initializer that receives a writable view
    /// of the freshly allocated region.
    Fill {
        /// Exact number of bytes to allocate.
        len: u32,
        /// Initializer invoked with the allocated region.
        init: FillFn<'a>,
    },
}

impl<'a> ByteSource<'a> {
    /// Stage `len` bytes produced by `init` without copying through a host
    /// buffer.
    ///
    /// If `init` fails, the allocation is freed before the error propagates.
    pub fn fill<F>(len: u32, init: F) -> Self
    where
        F: FnOnce(&mut [u8]) -> Result<()> + 'a,
    {
        Self::Fill {
            len,
            init: Box::new(init),
        }
    }
}

impl fmt::Debug for ByteSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Self::Fill { len, .. } => f.debug_struct("Fill").field("len", len).finish(),
        }
    }
}

impl<'a> From<&'a [u8]> for ByteSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(Cow::Borrowed(bytes))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ByteSource<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::Bytes(Cow::Borrowed(bytes))
    }
}

impl From<Vec<u8>> for ByteSource<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Cow::Owned(bytes))
    }
}

impl<'a> From<&'a str> for ByteSource<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(Cow::Borrowed(text))
    }
}

impl From<String> for ByteSource<'_> {
    fn from(text: String) -> Self {
        Self::Text(Cow::Owned(text))
    }
}

/// A staged input: the allocation's address and its byte length.
///
/// The caller owns the allocation and must pass both values back to
/// `free_u8` once the boundary call that consumes it has returned.
#[derive(Debug, Clone, Copy)]
pub struct Staged {
    /// Address of the staged allocation.
    pub ptr: ArenaPtr,
    /// Length of the staged data in bytes.
    pub len: u32,
}

/// Stage an input buffer into module memory.
pub(crate) fn stage<E: ModuleExports>(exports: &mut E, source: ByteSource<'_>) -> Result<Staged> {
    match source {
        ByteSource::Bytes(data) => stage_copy(exports, &data),
        ByteSource::Text(text) => stage_copy(exports, text.as_bytes()),
        ByteSource::Fill { len, init } => stage_fill(exports, len, init),
    }
}

fn stage_copy<E: ModuleExports>(exports: &mut E, data: &[u8]) -> Result<Staged> {
    let len = byte_len(data.len())?;
    let ptr = exports.malloc_u8(len)?;

    if len > 0 {
        let offset = ptr.as_u32() as usize;
        let ok = exports
            .memory_mut()
            .get_mut(offset..offset + data.len())
            .map(|dest| dest.copy_from_slice(data))
            .is_some();
        if !ok {
            exports.free_u8(ptr, len)?;
            return Err(GzipError::MemoryAccess {
                offset: ptr.as_u32(),
                len,
            });
        }
    }

    Ok(Staged { ptr, len })
}

fn stage_fill<E: ModuleExports>(exports: &mut E, len: u32, init: FillFn<'_>) -> Result<Staged> {
    let ptr = exports.malloc_u8(len)?;
    let offset = ptr.as_u32() as usize;

    let filled = match exports.memory_mut().get_mut(offset..offset + len as usize) {
        Some(view) => init(view),
        None => Err(GzipError::MemoryAccess {
            offset: ptr.as_u32(),
            len,
        }),
    };

    if let Err(err) = filled {
        // No leak on a failed fill: return the allocation before
        // propagating the initializer's error.
        exports.free_u8(ptr, len)?;
        return Err(err);
    }

    Ok(Staged { ptr, len })
}

/// A range-checked read-only view of module memory.
pub(crate) fn slice<E: ModuleExports>(exports: &E, ptr: BufferPtr, len: u32) -> Result<&[u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    let offset = ptr.as_u32() as usize;
    exports
        .memory()
        .get(offset..offset + len as usize)
        .ok_or(GzipError::MemoryAccess {
            offset: ptr.as_u32(),
            len,
        })
}

/// Recover the pending error message from the module's error channel.
///
/// Must run before any further boundary call: the message region is reused
/// on the next operation, exactly like the shared output buffer. Invalid
/// UTF-8 sequences are substituted rather than rejected.
pub(crate) fn read_error_message<E: ModuleExports>(exports: &mut E) -> Result<String> {
    let ptr = exports.error_message()?;
    let len = exports.error_message_len()?;
    let bytes = slice(exports, ptr, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn byte_len(len: usize) -> Result<u32> {
    // Inputs beyond the 32-bit address space cannot cross the boundary.
    u32::try_from(len).map_err(|_| GzipError::AllocationFailure {
        requested: len as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModule;

    #[test]
    fn stage_bytes_copies_into_module_memory() {
        let mut module = MockModule::new();
        let staged = stage(&mut module, ByteSource::from(&[1u8, 2, 3, 4])).unwrap();
        assert_eq!(staged.len, 4);

        let offset = staged.ptr.as_u32() as usize;
        assert_eq!(&module.memory()[offset..offset + 4], &[1, 2, 3, 4]);
        assert_eq!(module.outstanding(), 1);

        module.free_u8(staged.ptr, staged.len).unwrap();
        assert_eq!(module.outstanding(), 0);
    }

    #[test]
    fn stage_text_encodes_utf8() {
        let mut module = MockModule::new();
        let staged = stage(&mut module, ByteSource::from("héllo")).unwrap();
        assert_eq!(staged.len, "héllo".len() as u32);

        let offset = staged.ptr.as_u32() as usize;
        assert_eq!(
            &module.memory()[offset..offset + staged.len as usize],
            "héllo".as_bytes()
        );
        module.free_u8(staged.ptr, staged.len).unwrap();
    }

    #[test]
    fn stage_fill_writes_in_place() {
        let mut module = MockModule::new();
        let staged = stage(
            &mut module,
            ByteSource::fill(8, |buf| {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = i as u8;
                }
                Ok(())
            }),
        )
        .unwrap();

        let offset = staged.ptr.as_u32() as usize;
        assert_eq!(
            &module.memory()[offset..offset + 8],
            &[0, 1, 2, 3, 4, 5, 6, 7]
        );
        module.free_u8(staged.ptr, staged.len).unwrap();
    }

    #[test]
    fn failed_fill_frees_the_allocation() {
        let mut module = MockModule::new();
        let err = stage(
            &mut module,
            ByteSource::fill(16, |_| Err(GzipError::fill("source dried up"))),
        )
        .unwrap_err();

        assert!(matches!(err, GzipError::Fill { .. }));
        assert_eq!(module.outstanding(), 0);
    }

    #[test]
    fn stage_empty_input_allocates_nothing_writable() {
        let mut module = MockModule::new();
        let staged = stage(&mut module, ByteSource::from(&b""[..])).unwrap();
        assert_eq!(staged.len, 0);
        module.free_u8(staged.ptr, staged.len).unwrap();
        assert_eq!(module.outstanding(), 0);
    }
}
