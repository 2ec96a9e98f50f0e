//! Bi-level bitmaps and their composition.

use crate::region::CombinationOperator;

/// A bitmap with one `bool` per pixel, where `true` is black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bitmap {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<bool>,
}

impl Bitmap {
    pub(crate) fn new(width: u32, height: u32, fill: bool) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width as usize * height as usize],
        }
    }

    /// The pixel at the given position, or `false` outside of the bitmap.
    #[inline]
    pub(crate) fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }

        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub(crate) fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = value;
        }
    }

    /// Copy row `from` onto row `to`.
    pub(crate) fn copy_row(&mut self, from: u32, to: u32) {
        let w = self.width as usize;
        let src = from as usize * w;
        self.data.copy_within(src..src + w, to as usize * w);
    }

    /// Grow the bitmap to `height` rows, filling new rows with `fill`.
    pub(crate) fn grow(&mut self, height: u32, fill: bool) {
        if height > self.height {
            self.data.resize(self.width as usize * height as usize, fill);
            self.height = height;
        }
    }

    /// Draw `other` at the given offset (7.4.1.5).
    pub(crate) fn combine(&mut self, other: &Self, x: u32, y: u32, op: CombinationOperator) {
        self.combine_at(other, i64::from(x), i64::from(y), op);
    }

    /// Draw `other` at an offset that may lie outside of this bitmap.
    ///
    /// Pixels falling outside are clipped.
    pub(crate) fn combine_at(&mut self, other: &Self, x: i64, y: i64, op: CombinationOperator) {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let (sw, sh) = (i64::from(other.width), i64::from(other.height));

        let x0 = x.clamp(0, w);
        let x1 = x.saturating_add(sw).clamp(0, w);
        let y0 = y.clamp(0, h);
        let y1 = y.saturating_add(sh).clamp(0, h);

        for dy in y0..y1 {
            let src_row = (dy - y) as usize * other.width as usize;
            let dst_row = dy as usize * self.width as usize;

            for dx in x0..x1 {
                let src = other.data[src_row + (dx - x) as usize];
                let dst = &mut self.data[dst_row + dx as usize];

                *dst = match op {
                    CombinationOperator::Or => *dst | src,
                    CombinationOperator::And => *dst & src,
                    CombinationOperator::Xor => *dst ^ src,
                    CombinationOperator::Xnor => !(*dst ^ src),
                    CombinationOperator::Replace => src,
                };
            }
        }
    }

    /// The `width` x `height` area starting at `x`, `y`.
    ///
    /// Pixels outside of this bitmap are white.
    pub(crate) fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let mut out = Self::new(width, height, false);

        for oy in 0..height {
            for ox in 0..width {
                let pixel = self.get(i64::from(x) + i64::from(ox), i64::from(y) + i64::from(oy));
                out.set(ox, oy, pixel);
            }
        }

        out
    }

    /// Pack the rows MSB first, each padded to a whole byte.
    pub(crate) fn pack(&self) -> Vec<u8> {
        let stride = (self.width as usize).div_ceil(8);
        let mut out = vec![0_u8; stride * self.height as usize];

        for (y, row) in self.data.chunks(self.width.max(1) as usize).enumerate() {
            for (x, _) in row.iter().enumerate().filter(|(_, p)| **p) {
                out[y * stride + x / 8] |= 0x80 >> (x % 8);
            }
        }

        out
    }
}
