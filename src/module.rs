//! The compute module's export surface and its wasmtime binding.
//!
//! [`ModuleExports`] is the capability set the rest of the crate programs
//! against: linear memory access, the arena allocator pair, the shared
//! output buffer, the error channel, and the two codec entry points.
//! [`WasmExports`] implements it over a wasmtime instance; the in-process
//! emulation in [`crate::testing`] implements it for tests.

use crate::error::{GzipError, Result};
use crate::types::{ArenaPtr, BufferPtr};
use wasmtime::{Engine, Instance, Memory, Module, Store, TypedFunc};

/// Sentinel length signaling a failed operation.
///
/// `gzip_decompress` returns this all-bits-set value instead of a result
/// length when the input cannot be decoded; the error detail is then staged
/// in the module's error channel.
pub const ERROR_SENTINEL: u32 = 0xffff_ffff;

/// Capabilities exported by a loaded gzip compute module.
///
/// Every method that calls into the module takes `&mut self`: calls are
/// strictly sequential, and the validity windows of the shared output buffer
/// and the error message assume no operation begins before the previous
/// one's result has been consumed or copied.
pub trait ModuleExports {
    /// The module's linear memory.
    fn memory(&self) -> &[u8];

    /// The module's linear memory, writable.
    fn memory_mut(&mut self) -> &mut [u8];

    /// Address of the current shared output buffer.
    fn buffer(&mut self) -> Result<BufferPtr>;

    /// Address of the pending error message.
    fn error_message(&mut self) -> Result<BufferPtr>;

    /// Length of the pending error message in bytes.
    fn error_message_len(&mut self) -> Result<u32>;

    /// Allocate `len` bytes inside the module.
    fn malloc_u8(&mut self, len: u32) -> Result<ArenaPtr>;

    /// Return an allocation of `len` bytes at `ptr` to the module allocator.
    fn free_u8(&mut self, ptr: ArenaPtr, len: u32) -> Result<()>;

    /// Release the shared output buffer early.
    fn deallocate_buffer(&mut self) -> Result<()>;

    /// Compress `len` bytes at `input`; returns the output-buffer length.
    fn gzip_compress(&mut self, input: ArenaPtr, len: u32, flags: u32) -> Result<u32>;

    /// Decompress `len` bytes at `input`; returns the output-buffer length,
    /// or [`ERROR_SENTINEL`] on failure.
    fn gzip_decompress(&mut self, input: ArenaPtr, len: u32, flags: u32) -> Result<u32>;
}

/// Export surface of a wasmtime-instantiated gzip module.
///
/// Owns the store and the typed bindings for every export the protocol
/// depends on. Binding is done once at instantiation, so a module missing an
/// export is rejected up front as a load failure rather than trapping later.
pub struct WasmExports {
    store: Store<()>,
    memory: Memory,
    buffer: TypedFunc<(), u32>,
    error_message: TypedFunc<(), u32>,
    error_message_len: TypedFunc<(), u32>,
    malloc_u8: TypedFunc<u32, u32>,
    free_u8: TypedFunc<(u32, u32), ()>,
    deallocate_buffer: TypedFunc<(), ()>,
    gzip_compress: TypedFunc<(u32, u32, u32), u32>,
    gzip_decompress: TypedFunc<(u32, u32, u32), u32>,
}

impl WasmExports {
    /// Instantiate a compiled module and bind its export surface.
    ///
    /// The gzip module imports nothing, so instantiation cannot call back
    /// into the host.
    pub fn instantiate(engine: &Engine, module: &Module) -> Result<Self> {
        let mut store = Store::new(engine, ());

        let instance =
            Instance::new(&mut store, module, &[]).map_err(|e| GzipError::Load {
                module: "instance".to_string(),
                cause: e.to_string(),
            })?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| missing_export("memory"))?;

        let buffer = typed_export(&instance, &mut store, "buffer")?;
        let error_message = typed_export(&instance, &mut store, "error_message")?;
        let error_message_len = typed_export(&instance, &mut store, "error_message_len")?;
        let malloc_u8 = typed_export(&instance, &mut store, "malloc_u8")?;
        let free_u8 = typed_export(&instance, &mut store, "free_u8")?;
        let deallocate_buffer = typed_export(&instance, &mut store, "deallocate_buffer")?;
        let gzip_compress = typed_export(&instance, &mut store, "gzip_compress")?;
        let gzip_decompress = typed_export(&instance, &mut store, "gzip_decompress")?;

        Ok(Self {
            store,
            memory,
            buffer,
            error_message,
            error_message_len,
            malloc_u8,
            free_u8,
            deallocate_buffer,
            gzip_compress,
            gzip_decompress,
        })
    }
}

fn missing_export(name: &str) -> GzipError {
    GzipError::Load {
        module: "instance".to_string(),
        cause: format!("module does not export '{name}'"),
    }
}

fn typed_export<Params, Results>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<Params, Results>>
where
    Params: wasmtime::WasmParams,
    Results: wasmtime::WasmResults,
{
    instance
        .get_typed_func(&mut *store, name)
        .map_err(|e| GzipError::Load {
            module: "instance".to_string(),
            cause: format!("module does not export '{name}': {e}"),
        })
}

fn trap(function: &'static str) -> impl FnOnce(wasmtime::Error) -> GzipError {
    move |e| GzipError::Boundary {
        function,
        cause: e.to_string(),
    }
}

impl ModuleExports for WasmExports {
    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn buffer(&mut self) -> Result<BufferPtr> {
        self.buffer
            .call(&mut self.store, ())
            .map(BufferPtr::new)
            .map_err(trap("buffer"))
    }

    fn error_message(&mut self) -> Result<BufferPtr> {
        self.error_message
            .call(&mut self.store, ())
            .map(BufferPtr::new)
            .map_err(trap("error_message"))
    }

    fn error_message_len(&mut self) -> Result<u32> {
        self.error_message_len
            .call(&mut self.store, ())
            .map_err(trap("error_message_len"))
    }

    fn malloc_u8(&mut self, len: u32) -> Result<ArenaPtr> {
        // An allocator trap means the module ran out of memory; surface it
        // as allocation failure rather than a generic boundary error.
        self.malloc_u8
            .call(&mut self.store, len)
            .map(ArenaPtr::new)
            .map_err(|_| GzipError::AllocationFailure {
                requested: u64::from(len),
            })
    }

    fn free_u8(&mut self, ptr: ArenaPtr, len: u32) -> Result<()> {
        self.free_u8
            .call(&mut self.store, (ptr.as_u32(), len))
            .map_err(trap("free_u8"))
    }

    fn deallocate_buffer(&mut self) -> Result<()> {
        self.deallocate_buffer
            .call(&mut self.store, ())
            .map_err(trap("deallocate_buffer"))
    }

    fn gzip_compress(&mut self, input: ArenaPtr, len: u32, flags: u32) -> Result<u32> {
        self.gzip_compress
            .call(&mut self.store, (input.as_u32(), len, flags))
            .map_err(trap("gzip_compress"))
    }

    fn gzip_decompress(&mut self, input: ArenaPtr, len: u32, flags: u32) -> Result<u32> {
        self.gzip_decompress
            .call(&mut self.store, (input.as_u32(), len, flags))
            .map_err(trap("gzip_decompress"))
    }
}
