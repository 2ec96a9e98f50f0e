//! The MQ arithmetic decoder (Annex E).
//!
//! This follows the software conventions of E.3, where the code register is
//! kept inverted so that no carry propagation is needed. Reading past the end
//! of the data yields `0xFF` bytes, which act like an end marker.

/// The adaptive state of a single context.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Context {
    index: u8,
    mps: u8,
}

#[derive(Debug, Clone, Copy)]
struct Qe {
    value: u32,
    next_mps: u8,
    next_lps: u8,
    switch: bool,
}

const fn qe(value: u32, next_mps: u8, next_lps: u8, switch: bool) -> Qe {
    Qe {
        value,
        next_mps,
        next_lps,
        switch,
    }
}

/// Table E.1.
#[rustfmt::skip]
static QE_TABLE: [Qe; 47] = [
    qe(0x5601, 1, 1, true),    qe(0x3401, 2, 6, false),   qe(0x1801, 3, 9, false),
    qe(0x0AC1, 4, 12, false),  qe(0x0521, 5, 29, false),  qe(0x0221, 38, 33, false),
    qe(0x5601, 7, 6, true),    qe(0x5401, 8, 14, false),  qe(0x4801, 9, 14, false),
    qe(0x3801, 10, 14, false), qe(0x3001, 11, 17, false), qe(0x2401, 12, 18, false),
    qe(0x1C01, 13, 20, false), qe(0x1601, 29, 21, false), qe(0x5601, 15, 14, true),
    qe(0x5401, 16, 14, false), qe(0x5101, 17, 15, false), qe(0x4801, 18, 16, false),
    qe(0x3801, 19, 17, false), qe(0x3401, 20, 18, false), qe(0x3001, 21, 19, false),
    qe(0x2801, 22, 19, false), qe(0x2401, 23, 20, false), qe(0x2201, 24, 21, false),
    qe(0x1C01, 25, 22, false), qe(0x1801, 26, 23, false), qe(0x1601, 27, 24, false),
    qe(0x1401, 28, 25, false), qe(0x1201, 29, 26, false), qe(0x1101, 30, 27, false),
    qe(0x0AC1, 31, 28, false), qe(0x09C1, 32, 29, false), qe(0x08A1, 33, 30, false),
    qe(0x0521, 34, 31, false), qe(0x0441, 35, 32, false), qe(0x02A1, 36, 33, false),
    qe(0x0221, 37, 34, false), qe(0x0141, 38, 35, false), qe(0x0111, 39, 36, false),
    qe(0x0085, 40, 37, false), qe(0x0049, 41, 38, false), qe(0x0025, 42, 39, false),
    qe(0x0015, 43, 40, false), qe(0x0009, 44, 41, false), qe(0x0005, 45, 42, false),
    qe(0x0001, 45, 43, false), qe(0x5601, 46, 46, false),
];

pub(crate) struct ArithmeticDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    c: u32,
    a: u32,
    ct: u32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// INITDEC (E.3.5).
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            pos: 0,
            c: 0,
            a: 0,
            ct: 0,
        };

        decoder.c = (u32::from(decoder.byte_at(0)) ^ 0xFF) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        decoder.a = 0x8000;

        decoder
    }

    /// DECODE (E.3.2), returning the decoded bit.
    #[inline]
    pub(crate) fn decode(&mut self, cx: &mut Context) -> u8 {
        let qe = QE_TABLE[cx.index as usize];
        self.a -= qe.value;

        if (self.c >> 16) < self.a {
            if self.a & 0x8000 != 0 {
                return cx.mps;
            }

            let d = self.mps_exchange(cx, qe);
            self.renormalize();
            d
        } else {
            self.c -= self.a << 16;
            let d = self.lps_exchange(cx, qe);
            self.renormalize();
            d
        }
    }

    fn mps_exchange(&mut self, cx: &mut Context, qe: Qe) -> u8 {
        if self.a < qe.value {
            let d = 1 - cx.mps;
            if qe.switch {
                cx.mps = 1 - cx.mps;
            }
            cx.index = qe.next_lps;
            d
        } else {
            cx.index = qe.next_mps;
            cx.mps
        }
    }

    fn lps_exchange(&mut self, cx: &mut Context, qe: Qe) -> u8 {
        let d = if self.a < qe.value {
            cx.index = qe.next_mps;
            cx.mps
        } else {
            let d = 1 - cx.mps;
            if qe.switch {
                cx.mps = 1 - cx.mps;
            }
            cx.index = qe.next_lps;
            d
        };

        self.a = qe.value;
        d
    }

    /// RENORMD (E.3.3).
    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }

            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEIN (E.3.4).
    fn byte_in(&mut self) {
        if self.byte_at(self.pos) == 0xFF {
            if self.byte_at(self.pos + 1) > 0x8F {
                // A marker: keep feeding 1-bits without advancing.
                self.ct = 8;
            } else {
                self.pos += 1;
                self.c = self
                    .c
                    .wrapping_add(0xFE00)
                    .wrapping_sub(u32::from(self.byte_at(self.pos)) << 9);
                self.ct = 7;
            }
        } else {
            self.pos += 1;
            self.c = self
                .c
                .wrapping_add(0xFF00)
                .wrapping_sub(u32::from(self.byte_at(self.pos)) << 8);
            self.ct = 8;
        }
    }

    #[inline]
    fn byte_at(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0xFF)
    }
}

/// The MQ encoder of E.2, used to build test data.
#[cfg(test)]
pub(crate) struct ArithmeticEncoder {
    /// The first byte stands in for the byte before the start of the data.
    out: Vec<u8>,
    c: u32,
    a: u32,
    ct: u32,
}

#[cfg(test)]
impl ArithmeticEncoder {
    pub(crate) fn new() -> Self {
        Self {
            out: vec![0],
            c: 0,
            a: 0x8000,
            ct: 12,
        }
    }

    pub(crate) fn encode(&mut self, cx: &mut Context, bit: u8) {
        let qe = QE_TABLE[cx.index as usize];
        self.a -= qe.value;

        if bit == cx.mps {
            if self.a & 0x8000 != 0 {
                self.c += qe.value;
                return;
            }

            if self.a < qe.value {
                self.a = qe.value;
            } else {
                self.c += qe.value;
            }
            cx.index = qe.next_mps;
        } else {
            if self.a < qe.value {
                self.c += qe.value;
            } else {
                self.a = qe.value;
            }
            if qe.switch {
                cx.mps = 1 - cx.mps;
            }
            cx.index = qe.next_lps;
        }

        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.ct == 0 {
                self.byte_out();
            }

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn byte_out(&mut self) {
        let last = self.out.len() - 1;

        if self.out[last] == 0xFF {
            self.stuffed_byte();
        } else if self.c < 0x800_0000 {
            self.plain_byte();
        } else {
            self.out[last] += 1;

            if self.out[last] == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.stuffed_byte();
            } else {
                self.plain_byte();
            }
        }
    }

    fn stuffed_byte(&mut self) {
        self.out.push((self.c >> 20) as u8);
        self.c &= 0xF_FFFF;
        self.ct = 7;
    }

    fn plain_byte(&mut self) {
        self.out.push((self.c >> 19) as u8);
        self.c &= 0x7_FFFF;
        self.ct = 8;
    }

    /// FLUSH (E.2.9), terminating the data with the `0xFF 0xAC` marker.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();

        if self.out.last() != Some(&0xFF) {
            self.out.push(0xFF);
        }
        self.out.push(0xAC);
        self.out.remove(0);
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_sequence() {
        // The test sequence of H.2, coded with a single context.
        let encoded = [
            0x84, 0xC7, 0x3B, 0xFC, 0xE1, 0xA1, 0x43, 0x04, 0x02, 0x20, 0x00, 0x00, 0x41, 0x0D,
            0xBB, 0x86, 0xF4, 0x31, 0x7F, 0xFF, 0x88, 0xFF, 0x37, 0x47, 0x1A, 0xDB, 0x6A, 0xDF,
            0xFF, 0xAC,
        ];
        let expected = [
            0x00, 0x02, 0x00, 0x51, 0x00, 0x00, 0x00, 0xC0, 0x03, 0x52, 0x87, 0x2A, 0xAA, 0xAA,
            0xAA, 0xAA, 0x82, 0xC0, 0x20, 0x00, 0xFC, 0xD7, 0x9E, 0xF6, 0xBF, 0x7F, 0xED, 0x90,
            0x4F, 0x46, 0xA3, 0xBF,
        ];

        let mut decoder = ArithmeticDecoder::new(&encoded);
        let mut cx = Context::default();

        for byte in expected {
            let mut decoded = 0_u8;
            for _ in 0..8 {
                decoded = (decoded << 1) | decoder.decode(&mut cx);
            }
            assert_eq!(decoded, byte);
        }
    }

    #[test]
    fn encoder_reproduces_reference_sequence() {
        let bits = [
            0x00, 0x02, 0x00, 0x51, 0x00, 0x00, 0x00, 0xC0, 0x03, 0x52, 0x87, 0x2A, 0xAA, 0xAA,
            0xAA, 0xAA, 0x82, 0xC0, 0x20, 0x00, 0xFC, 0xD7, 0x9E, 0xF6, 0xBF, 0x7F, 0xED, 0x90,
            0x4F, 0x46, 0xA3, 0xBF,
        ];

        let mut encoder = ArithmeticEncoder::new();
        let mut cx = Context::default();
        for byte in bits {
            for i in (0..8).rev() {
                encoder.encode(&mut cx, (byte >> i) & 1);
            }
        }

        assert_eq!(
            encoder.finish(),
            [
                0x84, 0xC7, 0x3B, 0xFC, 0xE1, 0xA1, 0x43, 0x04, 0x02, 0x20, 0x00, 0x00, 0x41,
                0x0D, 0xBB, 0x86, 0xF4, 0x31, 0x7F, 0xFF, 0x88, 0xFF, 0x37, 0x47, 0x1A, 0xDB,
                0x6A, 0xDF, 0xFF, 0xAC,
            ]
        );
    }

    #[test]
    fn empty_input_does_not_panic() {
        let mut decoder = ArithmeticDecoder::new(&[]);
        let mut cx = Context::default();

        for _ in 0..64 {
            assert!(decoder.decode(&mut cx) <= 1);
        }
    }
}
