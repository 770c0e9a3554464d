//! Body compression for `content-encoding`.

use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;

use super::registry::Encoding;
use super::{CodecError, CodecResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress `data` with `encoding`
pub fn decompress(encoding: Encoding, data: &[u8]) -> CodecResult<Vec<u8>> {
    let mut output = Vec::new();
    let result = match encoding {
        Encoding::Deflate if data.starts_with(&GZIP_MAGIC) => {
            GzDecoder::new(data).read_to_end(&mut output)
        }
        Encoding::Deflate => ZlibDecoder::new(data).read_to_end(&mut output),
        Encoding::Bzip2 => BzDecoder::new(data).read_to_end(&mut output),
    };
    result.map_err(|e| CodecError::compression(encoding.name(), e.to_string()))?;
    Ok(output)
}

/// Compress `data` with `encoding`
pub fn compress(encoding: Encoding, data: &[u8]) -> CodecResult<Vec<u8>> {
    let result = match encoding {
        Encoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).and_then(|_| encoder.finish())
        }
        Encoding::Bzip2 => {
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data).and_then(|_| encoder.finish())
        }
    };
    result.map_err(|e| CodecError::compression(encoding.name(), e.to_string()))
}
