//! Boundary-protocol tests against a real wasmtime instance.
//!
//! The marker codec from `common` stands in for the gzip module so these
//! tests exercise the actual wasm path: export binding, arena staging and
//! freeing, flag passing, sentinel detection with error-channel recovery,
//! and the shared-buffer lifecycle.

mod common;

use common::{incomplete_module, marker_codec, MARKER_ERROR};
use wasm_gzip::{
    ByteSource, CompressionOptions, DecompressionOptions, GzipError, Loader,
};

#[test]
fn marker_codec_round_trip() {
    let loader = Loader::new();
    let module = loader.init_sync(marker_codec()).unwrap();
    let mut gzip = module.lock();

    let compressed = gzip
        .compress(&b"abc"[..], &CompressionOptions::new())
        .unwrap()
        .to_vec();
    assert_eq!(compressed, [0x1f, 0x8b, b'a', b'b', b'c']);

    let original = gzip
        .decompress(&compressed[..], &DecompressionOptions::new())
        .unwrap();
    assert_eq!(&*original, b"abc");
}

#[test]
fn empty_input_crosses_the_boundary() {
    let loader = Loader::new();
    let module = loader.init_sync(marker_codec()).unwrap();
    let mut gzip = module.lock();

    let compressed = gzip
        .compress(&b""[..], &CompressionOptions::new())
        .unwrap()
        .to_vec();
    assert_eq!(compressed, [0x1f, 0x8b]);

    let original = gzip
        .decompress(&compressed[..], &DecompressionOptions::new())
        .unwrap();
    assert!(original.is_empty());
}

#[test]
fn sentinel_recovers_the_module_error_message() {
    let loader = Loader::new();
    let module = loader.init_sync(marker_codec()).unwrap();
    let mut gzip = module.lock();

    let err = gzip
        .decompress(&[42u8, 0, 7][..], &DecompressionOptions::new())
        .unwrap_err();
    match err {
        GzipError::Decoding { message } => assert_eq!(message, MARKER_ERROR),
        other => panic!("expected Decoding, got {other:?}"),
    }

    // A decoding failure leaves the handle fully usable.
    let out = gzip
        .compress(&b"still alive"[..], &CompressionOptions::new())
        .unwrap();
    assert_eq!(out.len(), b"still alive".len() + 2);
}

#[test]
fn zero_copy_fill_is_what_gets_compressed() {
    let loader = Loader::new();
    let module = loader.init_sync(marker_codec()).unwrap();
    let mut gzip = module.lock();

    let mut written = Vec::new();
    let compressed = gzip
        .compress(
            ByteSource::fill(64, |buf| {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = (i as u8).wrapping_mul(31);
                }
                written.extend_from_slice(buf);
                Ok(())
            }),
            &CompressionOptions::new(),
        )
        .unwrap()
        .to_vec();

    assert_eq!(written.len(), 64);
    assert_eq!(&compressed[2..], &written[..]);
}

#[test]
fn views_survive_as_copies_across_calls() {
    let loader = Loader::new();
    let module = loader.init_sync(marker_codec()).unwrap();
    let mut gzip = module.lock();

    let first = gzip
        .compress(&b"first"[..], &CompressionOptions::new())
        .unwrap()
        .to_vec();
    // The next operation reuses the output slot; the copy must be unaffected.
    let _second = gzip
        .compress(&b"second payload"[..], &CompressionOptions::new())
        .unwrap();
    assert_eq!(first, [0x1f, 0x8b, b'f', b'i', b'r', b's', b't']);
}

#[test]
fn free_buffer_is_safe_between_operations() {
    let loader = Loader::new();
    let module = loader.init_sync(marker_codec()).unwrap();
    let mut gzip = module.lock();

    gzip.compress(&b"payload"[..], &CompressionOptions::new())
        .unwrap();
    gzip.free_buffer().unwrap();

    // Purely an optimization: the handle keeps working afterwards.
    let out = gzip
        .compress(&b"again"[..], &CompressionOptions::new())
        .unwrap();
    assert_eq!(&out[2..], b"again");
}

#[test]
fn incomplete_module_is_rejected_at_binding() {
    let loader = Loader::new();
    let err = loader.init_sync(incomplete_module()).unwrap_err();
    match err {
        GzipError::Load { cause, .. } => {
            assert!(cause.contains("does not export"), "unexpected cause: {cause}")
        }
        other => panic!("expected Load, got {other:?}"),
    }
    assert!(!loader.is_ready());
}

#[test]
fn init_sync_is_idempotent() {
    let loader = Loader::new();
    let first = loader.init_sync(marker_codec()).unwrap();
    let second = loader.init_sync(marker_codec()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    let from_handle = loader.handle().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &from_handle));
}
