//! Shared fixtures: WAT-built stand-ins for the gzip compute module.
//!
//! The marker codec implements the full export surface the bridge binds
//! against, with a trivial transformation instead of deflate: "compress"
//! prepends the two gzip magic bytes, "decompress" validates and strips
//! them, staging the fixed message `not gzip data` in the error channel and
//! returning the all-bits-set sentinel when the magic is missing. That is
//! enough to exercise staging, flag passing, sentinel detection, error
//! recovery, and the shared-buffer lifecycle through a real wasmtime
//! instance.

/// Error message the marker codec stages on a failed decompress.
#[allow(dead_code)]
pub const MARKER_ERROR: &str = "not gzip data";

/// Build the marker-codec module binary.
pub fn marker_codec() -> Vec<u8> {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (data (i32.const 16) "not gzip data")
            (global $bump (mut i32) (i32.const 1024))
            (global $buf_ptr (mut i32) (i32.const 0))
            (global $buf_len (mut i32) (i32.const 0))
            (global $err_ptr (mut i32) (i32.const 0))
            (global $err_len (mut i32) (i32.const 0))
            (func $grow_to (param $end i32)
                (block $done
                    (loop $more
                        (br_if $done
                            (i32.le_u
                                (local.get $end)
                                (i32.mul (memory.size) (i32.const 65536))))
                        (drop (memory.grow (i32.const 1)))
                        (br $more))))
            (func $alloc (param $len i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $bump))
                (global.set $bump (i32.add (global.get $bump) (local.get $len)))
                (call $grow_to (global.get $bump))
                (local.get $ptr))
            (func $fail (result i32)
                (global.set $err_ptr (i32.const 16))
                (global.set $err_len (i32.const 13))
                (i32.const -1))
            (func (export "malloc_u8") (param $len i32) (result i32)
                (call $alloc (local.get $len)))
            (func (export "free_u8") (param $ptr i32) (param $len i32))
            (func (export "buffer") (result i32) (global.get $buf_ptr))
            (func (export "error_message") (result i32) (global.get $err_ptr))
            (func (export "error_message_len") (result i32) (global.get $err_len))
            (func (export "deallocate_buffer")
                (global.set $buf_ptr (i32.const 0))
                (global.set $buf_len (i32.const 0)))
            (func (export "gzip_compress")
                    (param $ptr i32) (param $len i32) (param $flags i32) (result i32)
                (local $dst i32)
                (local.set $dst (call $alloc (i32.add (local.get $len) (i32.const 2))))
                (i32.store8 (local.get $dst) (i32.const 0x1f))
                (i32.store8 (i32.add (local.get $dst) (i32.const 1)) (i32.const 0x8b))
                (memory.copy
                    (i32.add (local.get $dst) (i32.const 2))
                    (local.get $ptr)
                    (local.get $len))
                (global.set $buf_ptr (local.get $dst))
                (global.set $buf_len (i32.add (local.get $len) (i32.const 2)))
                (global.get $buf_len))
            (func (export "gzip_decompress")
                    (param $ptr i32) (param $len i32) (param $flags i32) (result i32)
                (local $dst i32)
                (if (i32.lt_u (local.get $len) (i32.const 2))
                    (then (return (call $fail))))
                (if (i32.or
                        (i32.ne (i32.load8_u (local.get $ptr)) (i32.const 0x1f))
                        (i32.ne
                            (i32.load8_u (i32.add (local.get $ptr) (i32.const 1)))
                            (i32.const 0x8b)))
                    (then (return (call $fail))))
                (local.set $dst (call $alloc (i32.sub (local.get $len) (i32.const 2))))
                (memory.copy
                    (local.get $dst)
                    (i32.add (local.get $ptr) (i32.const 2))
                    (i32.sub (local.get $len) (i32.const 2)))
                (global.set $buf_ptr (local.get $dst))
                (global.set $buf_len (i32.sub (local.get $len) (i32.const 2)))
                (global.get $buf_len)))
    "#;
    wat::parse_str(wat).expect("failed to parse marker codec WAT")
}

/// Build a module that exports memory but none of the codec surface.
#[allow(dead_code)]
pub fn incomplete_module() -> Vec<u8> {
    let wat = r#"
        (module
            (memory (export "memory") 1))
    "#;
    wat::parse_str(wat).expect("failed to parse incomplete WAT")
}
