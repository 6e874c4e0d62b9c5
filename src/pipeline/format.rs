//! Format sniffing (spec §4.D step 1).

use crate::error::CoreError;

/// Declared or sniffed input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
}

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Inspect the first bytes of `data` to determine its format.
pub fn sniff(data: &[u8]) -> Result<ImageFormat, CoreError> {
    if data.len() >= 8 && data[..8] == PNG_MAGIC {
        return Ok(ImageFormat::Png);
    }
    if data.len() >= 2 && data[0] == 0x42 && data[1] == 0x4D {
        return Ok(ImageFormat::Bmp);
    }
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        return Ok(ImageFormat::Jpeg);
    }
    Err(CoreError::UnsupportedFormat(
        "first bytes match neither PNG, BMP, nor JPEG magic numbers".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_each_magic_number() {
        assert_eq!(sniff(&PNG_MAGIC).unwrap(), ImageFormat::Png);
        assert_eq!(sniff(&[0x42, 0x4D, 0, 0]).unwrap(), ImageFormat::Bmp);
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn unrecognized_bytes_are_unsupported() {
        assert!(matches!(
            sniff(&[0, 1, 2, 3, 4, 5, 6, 7]),
            Err(CoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn short_buffers_are_unsupported_not_panics() {
        assert!(sniff(&[]).is_err());
        assert!(sniff(&[0x42]).is_err());
    }
}
