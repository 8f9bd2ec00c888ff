use alloc::{sync::Arc, vec};

use crate::{
    color::{Rgb222, HSYNC_BIT},
    error::Error,
};

/// Alpha bits of a bitmap pixel (`AA BB GG RR`)
pub const ALPHA_SHIFT: u8 = HSYNC_BIT;

/// Any non-zero alpha draws the pixel; there is no blending
#[inline(always)]
pub const fn is_opaque(px: u8) -> bool {
    px >> ALPHA_SHIFT != 0
}

/// A fully opaque bitmap pixel
#[inline(always)]
pub const fn opaque(color: Rgb222) -> u8 {
    color.to_byte() | 0b11 << ALPHA_SHIFT
}

/// An 8 bit per pixel image, `AA BB GG RR`, rows stored top to bottom.
///
/// The pixel data is shared, so cloning a bitmap into a primitive or a
/// sprite frame is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: i32,
    height: i32,
    data: Arc<[u8]>,
}

impl Bitmap {
    pub fn new(width: i32, height: i32, data: impl Into<Arc<[u8]>>) -> Result<Bitmap, Error> {
        let data = data.into();
        let expected = (width.max(0) * height.max(0)) as usize;
        if width <= 0 || height <= 0 || data.len() != expected {
            return Err(Error::BitmapData {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Bitmap {
            width,
            height,
            data,
        })
    }

    /// Expands a 1 bit per pixel mask, most significant bit first and rows
    /// padded to whole bytes: set bits become `color`, clear bits transparent.
    pub fn from_mask(width: i32, height: i32, mask: &[u8], color: Rgb222) -> Result<Bitmap, Error> {
        let row_len = (width.max(0) as usize + 7) / 8;
        let expected = row_len * height.max(0) as usize;
        if mask.len() != expected {
            return Err(Error::BitmapData {
                width,
                height,
                expected,
                actual: mask.len(),
            });
        }
        let (w, h) = (width.max(0) as usize, height.max(0) as usize);
        let mut data = vec![0; w * h];
        for y in 0..h {
            let src = &mask[y * row_len..];
            for x in 0..w {
                if (src[x >> 3] << (x & 7)) & 0x80 != 0 {
                    data[y * w + x] = opaque(color);
                }
            }
        }
        Bitmap::new(width, height, data)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn pixel(&self, x: i32, y: i32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use embedded_graphics::prelude::RgbColor;

    #[test]
    fn mask_expands_to_opaque_pixels() {
        // 10 pixels wide: two bytes per row
        let mask = [0b1000_0000, 0b0100_0000, 0b0000_0001, 0b0000_0000];
        let bitmap = Bitmap::from_mask(10, 2, &mask, Rgb222::RED).unwrap();
        assert_eq!(bitmap.pixel(0, 0), 0b1100_0011);
        assert!(is_opaque(bitmap.pixel(9, 0)));
        assert!(!is_opaque(bitmap.pixel(1, 0)));
        assert!(is_opaque(bitmap.pixel(7, 1)));
        assert_eq!(bitmap.data().iter().filter(|&&p| is_opaque(p)).count(), 3);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        assert_eq!(
            Bitmap::new(4, 4, vec![0u8; 15]),
            Err(Error::BitmapData {
                width: 4,
                height: 4,
                expected: 16,
                actual: 15
            })
        );
        assert!(Bitmap::new(0, 4, vec![0u8; 0]).is_err());
        assert!(Bitmap::from_mask(9, 1, &[0xFF], Rgb222::WHITE).is_err());
    }
}
