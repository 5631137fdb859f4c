use crate::abi;
use crate::error::{Result, RuntimeError};

/// Pixel formats a core may negotiate for its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 15-bit packed RGB in a little-endian `u16`, top bit unused.
    Xrgb1555,
    /// 32-bit packed RGB in a little-endian `u32`, top byte unused.
    Xrgb8888,
    /// 16-bit packed RGB in a little-endian `u16`.
    Rgb565,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 3] = [Self::Xrgb1555, Self::Xrgb8888, Self::Rgb565];

    pub fn from_raw(code: u32) -> Result<Self> {
        match code {
            abi::pixel_format::XRGB1555 => Ok(Self::Xrgb1555),
            abi::pixel_format::XRGB8888 => Ok(Self::Xrgb8888),
            abi::pixel_format::RGB565 => Ok(Self::Rgb565),
            other => Err(RuntimeError::UnsupportedPixelFormat(other)),
        }
    }

    pub const fn code(self) -> u32 {
        match self {
            Self::Xrgb1555 => abi::pixel_format::XRGB1555,
            Self::Xrgb8888 => abi::pixel_format::XRGB8888,
            Self::Rgb565 => abi::pixel_format::RGB565,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.layout().bytes_per_pixel
    }

    /// In-memory layout of one pixel of this format.
    pub const fn layout(self) -> PixelLayout {
        match self {
            Self::Xrgb1555 => PixelLayout {
                bytes_per_pixel: 2,
                red: Channel { shift: 10, bits: 5 },
                green: Channel { shift: 5, bits: 5 },
                blue: Channel { shift: 0, bits: 5 },
            },
            Self::Xrgb8888 => PixelLayout {
                bytes_per_pixel: 4,
                red: Channel { shift: 16, bits: 8 },
                green: Channel { shift: 8, bits: 8 },
                blue: Channel { shift: 0, bits: 8 },
            },
            Self::Rgb565 => PixelLayout {
                bytes_per_pixel: 2,
                red: Channel { shift: 11, bits: 5 },
                green: Channel { shift: 5, bits: 6 },
                blue: Channel { shift: 0, bits: 5 },
            },
        }
    }
}

/// A colour component inside a packed little-endian pixel word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub shift: u32,
    pub bits: u32,
}

impl Channel {
    fn extract(self, word: u32) -> u8 {
        let value = (word >> self.shift) & ((1 << self.bits) - 1);
        // Replicate the high bits into the low ones so full intensity maps to 255.
        if self.bits >= 8 {
            value as u8
        } else {
            ((value << (8 - self.bits)) | (value >> (2 * self.bits - 8))) as u8
        }
    }

    fn insert(self, component: u8) -> u32 {
        (u32::from(component) >> (8 - self.bits)) << self.shift
    }
}

/// Component order and size of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub bytes_per_pixel: usize,
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
}

impl PixelLayout {
    fn read_word(&self, pixel: &[u8]) -> u32 {
        pixel[..self.bytes_per_pixel]
            .iter()
            .rev()
            .fold(0u32, |word, byte| (word << 8) | u32::from(*byte))
    }

    /// Decodes one pixel into opaque RGBA8.
    pub fn decode(&self, pixel: &[u8]) -> [u8; 4] {
        let word = self.read_word(pixel);
        [
            self.red.extract(word),
            self.green.extract(word),
            self.blue.extract(word),
            0xff,
        ]
    }

    /// Packs an RGB triple into this layout, dropping low bits the format cannot hold.
    pub fn encode(&self, rgb: [u8; 3]) -> Vec<u8> {
        let word = self.red.insert(rgb[0]) | self.green.insert(rgb[1]) | self.blue.insert(rgb[2]);
        word.to_le_bytes()[..self.bytes_per_pixel].to_vec()
    }
}

/// Converts a `width` x `height` region of packed pixels into tightly packed RGBA8.
pub fn convert_to_rgba(
    format: PixelFormat,
    src: &[u8],
    src_stride: usize,
    width: usize,
    height: usize,
    dst: &mut Vec<u8>,
) {
    let layout = format.layout();
    let bpp = layout.bytes_per_pixel;
    dst.clear();
    dst.reserve(width * height * 4);
    for row in src.chunks(src_stride).take(height) {
        for pixel in row[..width * bpp].chunks_exact(bpp) {
            dst.extend_from_slice(&layout.decode(pixel));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_codes_outside_the_known_set() {
        assert!(matches!(
            PixelFormat::from_raw(3),
            Err(RuntimeError::UnsupportedPixelFormat(3))
        ));
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_raw(format.code()).unwrap(), format);
        }
    }

    #[test]
    fn decodes_full_intensity_channels() {
        // 0RGB1555: pure red is 0x7C00.
        let red = PixelFormat::Xrgb1555.layout().decode(&0x7C00u16.to_le_bytes());
        assert_eq!(red, [255, 0, 0, 255]);

        // RGB565: pure green is 0x07E0.
        let green = PixelFormat::Rgb565.layout().decode(&0x07E0u16.to_le_bytes());
        assert_eq!(green, [0, 255, 0, 255]);

        // XRGB8888 is stored B, G, R, X in memory.
        let blue = PixelFormat::Xrgb8888.layout().decode(&[0xff, 0x00, 0x00, 0x00]);
        assert_eq!(blue, [0, 0, 255, 255]);
    }

    #[test]
    fn encode_matches_declared_component_order() {
        let bytes = PixelFormat::Xrgb8888.layout().encode([0x11, 0x22, 0x33]);
        assert_eq!(bytes, vec![0x33, 0x22, 0x11, 0x00]);

        let bytes = PixelFormat::Rgb565.layout().encode([0xff, 0x00, 0x00]);
        assert_eq!(bytes, 0xF800u16.to_le_bytes().to_vec());
    }

    #[test]
    fn converts_only_the_requested_region() {
        let format = PixelFormat::Rgb565;
        let white = format.layout().encode([255, 255, 255]);
        // 3 pixels per row of storage, only 2x2 requested.
        let mut src = Vec::new();
        for _ in 0..3 * 3 {
            src.extend_from_slice(&white);
        }
        let mut dst = Vec::new();
        convert_to_rgba(format, &src, 3 * 2, 2, 2, &mut dst);
        assert_eq!(dst.len(), 2 * 2 * 4);
        assert!(dst.iter().all(|b| *b == 255));
    }
}
