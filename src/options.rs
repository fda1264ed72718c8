//! Option-flag encoding for the compress and decompress operations.
//!
//! Each operation takes a single bit-packed flag word. The bit assignments
//! are fixed by the compute module's build and must match it exactly. The
//! compression and decompression flag spaces are independent per operation:
//! bit 1 means "no compression" to `gzip_compress` and "multi member" to
//! `gzip_decompress`. Keeping them as two distinct `bitflags` types makes
//! that separation impossible to violate, and makes unknown switches
//! unrepresentable.

use bitflags::bitflags;

bitflags! {
    /// Flag word accepted by the module's `gzip_compress` export.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompressFlags: u32 {
        /// Emit stored (uncompressed) deflate blocks.
        const NO_COMPRESSION = 1;
        /// Compress with fixed Huffman codes.
        const FIXED_HUFFMAN_CODES = 2;
    }
}

bitflags! {
    /// Flag word accepted by the module's `gzip_decompress` export.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecompressFlags: u32 {
        /// Decode and concatenate every gzip member in the input instead of
        /// only the first.
        const MULTI = 1;
    }
}

/// Options for [`GzipModule::compress`](crate::gzip::GzipModule::compress).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Disable LZ77 compression (stored blocks only).
    pub no_compression: bool,
    /// Compress with fixed Huffman codes.
    pub fixed_huffman_codes: bool,
}

impl CompressionOptions {
    /// Create options with every switch off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable LZ77 compression.
    #[must_use]
    pub fn with_no_compression(mut self) -> Self {
        self.no_compression = true;
        self
    }

    /// Compress with fixed Huffman codes.
    #[must_use]
    pub fn with_fixed_huffman_codes(mut self) -> Self {
        self.fixed_huffman_codes = true;
        self
    }

    /// Encode the set switches into the module's flag word.
    pub(crate) fn flags(&self) -> CompressFlags {
        let mut flags = CompressFlags::empty();
        if self.no_compression {
            flags |= CompressFlags::NO_COMPRESSION;
        }
        if self.fixed_huffman_codes {
            flags |= CompressFlags::FIXED_HUFFMAN_CODES;
        }
        flags
    }
}

/// Options for [`GzipModule::decompress`](crate::gzip::GzipModule::decompress).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecompressionOptions {
    /// Decode and concatenate all gzip members present in the input.
    pub multi: bool,
}

impl DecompressionOptions {
    /// Create options with every switch off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode all members of a multi-member gzip stream.
    #[must_use]
    pub fn with_multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Encode the set switches into the module's flag word.
    pub(crate) fn flags(&self) -> DecompressFlags {
        let mut flags = DecompressFlags::empty();
        if self.multi {
            flags |= DecompressFlags::MULTI;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_table_matches_module_build() {
        assert_eq!(CompressFlags::NO_COMPRESSION.bits(), 1);
        assert_eq!(CompressFlags::FIXED_HUFFMAN_CODES.bits(), 2);
        assert_eq!(DecompressFlags::MULTI.bits(), 1);
    }

    #[test]
    fn default_options_encode_to_zero() {
        assert_eq!(CompressionOptions::new().flags().bits(), 0);
        assert_eq!(DecompressionOptions::new().flags().bits(), 0);
    }

    #[test]
    fn switches_or_together() {
        let opts = CompressionOptions::new()
            .with_no_compression()
            .with_fixed_huffman_codes();
        assert_eq!(opts.flags().bits(), 3);

        let opts = DecompressionOptions::new().with_multi();
        assert_eq!(opts.flags().bits(), 1);
    }
}
