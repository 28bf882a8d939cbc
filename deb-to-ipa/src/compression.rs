// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Decompression of `data.tar` members.

The compression format of a `data.tar` member is derived from its filename
extension. Each supported format is implemented by a [Decompressor]. Adding
a format means adding a [Decompressor] and a [CompressionKind] variant; the
pipeline only ever talks to the trait.
*/

use {
    crate::{
        container::{ArchiveMember, DATA_MEMBER_PREFIX},
        error::{ConversionError, Result},
    },
    std::io::{Cursor, Read},
};

/// Compression format of a data archive member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CompressionKind {
    /// `.gz`
    Gzip,
    /// `.xz`
    Xz,
    /// `.bz2` or `.bzip2`
    Bzip2,
    /// `.lzma` (legacy LZMA-alone format)
    Lzma,
    /// A plain `data.tar` without extension.
    Uncompressed,
    /// An unrecognized member name.
    Unknown(String),
}

impl CompressionKind {
    /// Resolve the compression format from the name of an ar member.
    ///
    /// Only names of the form `data.tar` and `data.tar.<ext>` with a single,
    /// known extension are recognized. Names like `data.tar.gz.sig` are
    /// unknown rather than being guessed at.
    pub fn from_member_name(name: &str) -> Self {
        let tail = match name.strip_prefix(DATA_MEMBER_PREFIX) {
            Some(tail) => tail,
            None => return Self::Unknown(name.to_string()),
        };

        match tail {
            "" => Self::Uncompressed,
            ".gz" => Self::Gzip,
            ".xz" => Self::Xz,
            ".bz2" | ".bzip2" => Self::Bzip2,
            ".lzma" => Self::Lzma,
            _ => Self::Unknown(name.to_string()),
        }
    }

    /// Obtain the [Decompressor] implementing this format.
    pub fn decompressor(&self) -> Result<Box<dyn Decompressor>> {
        match self {
            Self::Gzip => Ok(Box::new(GzipDecompressor)),
            Self::Xz => Ok(Box::new(XzDecompressor)),
            Self::Bzip2 => Ok(Box::new(Bzip2Decompressor)),
            Self::Lzma => Ok(Box::new(LzmaDecompressor)),
            Self::Uncompressed => Ok(Box::new(PassthroughDecompressor)),
            Self::Unknown(name) => Err(ConversionError::UnsupportedCompression(name.clone())),
        }
    }

    /// Whether decompressing this format is slow enough to warrant a notice.
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Xz | Self::Lzma | Self::Bzip2)
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gzip => f.write_str("gzip"),
            Self::Xz => f.write_str("xz"),
            Self::Bzip2 => f.write_str("bzip2"),
            Self::Lzma => f.write_str("LZMA"),
            Self::Uncompressed => f.write_str("uncompressed"),
            Self::Unknown(name) => write!(f, "unknown ({})", name),
        }
    }
}

/// A decompression strategy for one compression format.
pub trait Decompressor {
    /// Construct a reader emitting decompressed data.
    ///
    /// Errors constructing the reader or reading from it indicate the
    /// compressed data is corrupt.
    fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>>;

    /// Decompress data fully into memory.
    ///
    /// Integrity checks defined by the format are validated once the end of
    /// the stream is reached. Any failure is [ConversionError::CorruptArchive].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader = self
            .reader(data)
            .map_err(|e| ConversionError::CorruptArchive(e.to_string()))?;

        let mut buffer = Vec::with_capacity(data.len() * 4);
        reader
            .read_to_end(&mut buffer)
            .map_err(|e| ConversionError::CorruptArchive(e.to_string()))?;

        Ok(buffer)
    }
}

/// Gzip (RFC 1952). Validates the header and the CRC32/size trailer.
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(libflate::gzip::Decoder::new(Cursor::new(data))?))
    }
}

/// xz container. liblzma validates the stream's integrity check.
pub struct XzDecompressor;

impl Decompressor for XzDecompressor {
    fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(xz2::read::XzDecoder::new(Cursor::new(data))))
    }
}

/// bzip2. Block and stream CRCs are validated.
pub struct Bzip2Decompressor;

impl Decompressor for Bzip2Decompressor {
    fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(bzip2::read::BzDecoder::new(Cursor::new(data))))
    }
}

/// Legacy `.lzma` (LZMA-alone). The format has no checksum; the header and
/// stream structure are still validated.
pub struct LzmaDecompressor;

impl Decompressor for LzmaDecompressor {
    fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>> {
        let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        Ok(Box::new(xz2::read::XzDecoder::new_stream(
            Cursor::new(data),
            stream,
        )))
    }
}

/// Plain tar data.
pub struct PassthroughDecompressor;

impl Decompressor for PassthroughDecompressor {
    fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(Cursor::new(data)))
    }
}

/// Decompress a `data.tar*` member, choosing the codec from its name.
pub fn decompress_member(member: &ArchiveMember) -> Result<Vec<u8>> {
    CompressionKind::from_member_name(member.name())
        .decompressor()?
        .decompress(member.payload())
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::compress};

    const KINDS: [(&str, CompressionKind); 4] = [
        ("data.tar.gz", CompressionKind::Gzip),
        ("data.tar.xz", CompressionKind::Xz),
        ("data.tar.bz2", CompressionKind::Bzip2),
        ("data.tar.lzma", CompressionKind::Lzma),
    ];

    #[test]
    fn kind_from_name() {
        for (name, kind) in KINDS.iter() {
            assert_eq!(&CompressionKind::from_member_name(name), kind, "{}", name);
        }

        assert_eq!(
            CompressionKind::from_member_name("data.tar.bzip2"),
            CompressionKind::Bzip2
        );
        assert_eq!(
            CompressionKind::from_member_name("data.tar"),
            CompressionKind::Uncompressed
        );
    }

    #[test]
    fn unknown_suffixes() {
        for name in [
            "data.tar.zst",
            "data.tar.zzz",
            "data.tar.gz.sig",
            "data.targz",
            "control.tar.gz",
        ] {
            let kind = CompressionKind::from_member_name(name);
            assert_eq!(kind, CompressionKind::Unknown(name.to_string()));
            assert!(matches!(
                kind.decompressor(),
                Err(ConversionError::UnsupportedCompression(n)) if n == name
            ));
        }
    }

    #[test]
    fn each_codec_decompresses() -> Result<()> {
        let plain = b"hello world ".repeat(1000);

        for (name, kind) in KINDS.iter() {
            let member = ArchiveMember::new(name, compress(kind, &plain));
            assert_eq!(decompress_member(&member)?, plain, "{}", name);
        }

        Ok(())
    }

    #[test]
    fn codec_mismatch_is_corrupt() {
        // xz data behind a .gz name fails the gzip header check.
        let member = ArchiveMember::new("data.tar.gz", compress(&CompressionKind::Xz, b"payload"));

        assert!(matches!(
            decompress_member(&member),
            Err(ConversionError::CorruptArchive(_))
        ));
    }

    #[test]
    fn gzip_bad_crc() {
        let mut data = compress(&CompressionKind::Gzip, &b"some tar data".repeat(100));
        // The trailer is CRC32 followed by the input size.
        let crc_offset = data.len() - 8;
        data[crc_offset] ^= 0xff;

        assert!(matches!(
            GzipDecompressor.decompress(&data),
            Err(ConversionError::CorruptArchive(_))
        ));
    }

    #[test]
    fn xz_bad_check() {
        let mut data = compress(&CompressionKind::Xz, &b"some tar data".repeat(100));
        let middle = data.len() / 2;
        data[middle] ^= 0xff;

        assert!(matches!(
            XzDecompressor.decompress(&data),
            Err(ConversionError::CorruptArchive(_))
        ));
    }

    #[test]
    fn lzma_truncated() {
        let data = compress(&CompressionKind::Lzma, &b"some tar data".repeat(100));

        assert!(matches!(
            LzmaDecompressor.decompress(&data[0..data.len() / 2]),
            Err(ConversionError::CorruptArchive(_))
        ));
    }

    #[test]
    fn lzma_bad_header() {
        // A properties byte above 224 is not a valid lc/lp/pb encoding.
        let mut data = compress(&CompressionKind::Lzma, b"payload");
        data[0] = 0xff;

        assert!(matches!(
            LzmaDecompressor.decompress(&data),
            Err(ConversionError::CorruptArchive(_))
        ));
    }

    #[test]
    fn bzip2_truncated() {
        let data = compress(&CompressionKind::Bzip2, &b"some tar data".repeat(100));

        assert!(matches!(
            Bzip2Decompressor.decompress(&data[0..data.len() / 2]),
            Err(ConversionError::CorruptArchive(_))
        ));
    }
}
