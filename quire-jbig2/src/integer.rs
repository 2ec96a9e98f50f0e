//! Arithmetic integer decoding (Annex A.2) and symbol ID decoding (A.3).

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};

/// One of the IAx integer decoding procedures, with its own contexts.
#[derive(Debug, Clone)]
pub(crate) struct IntegerDecoder {
    contexts: Vec<Context>,
}

impl IntegerDecoder {
    pub(crate) fn new() -> Self {
        Self {
            contexts: vec![Context::default(); 512],
        }
    }

    /// Decode a value, or `None` for the out-of-band value.
    pub(crate) fn decode(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Option<i32> {
        let mut prev = 1_u32;
        let negative = self.bit(decoder, &mut prev) == 1;

        // Prefix bits select the number of value bits and the base (Figure A.1).
        let (bits, base) = if self.bit(decoder, &mut prev) == 0 {
            (2, 0)
        } else if self.bit(decoder, &mut prev) == 0 {
            (4, 4)
        } else if self.bit(decoder, &mut prev) == 0 {
            (6, 20)
        } else if self.bit(decoder, &mut prev) == 0 {
            (8, 84)
        } else if self.bit(decoder, &mut prev) == 0 {
            (12, 340)
        } else {
            (32, 4436)
        };

        let mut value = 0_u32;
        for _ in 0..bits {
            value = (value << 1) | self.bit(decoder, &mut prev);
        }

        let value = i64::from(value) + base;

        match (negative, value) {
            (true, 0) => None,
            (true, v) => i32::try_from(-v).ok(),
            (false, v) => i32::try_from(v).ok(),
        }
    }

    fn bit(&mut self, decoder: &mut ArithmeticDecoder<'_>, prev: &mut u32) -> u32 {
        let d = u32::from(decoder.decode(&mut self.contexts[*prev as usize]));

        // PREV keeps a leading 1 bit and the last eight decoded bits.
        *prev = if *prev < 256 {
            (*prev << 1) | d
        } else {
            (((*prev << 1) | d) & 511) | 256
        };

        d
    }
}

/// The IAID decoding procedure for symbol IDs of `code_len` bits.
#[derive(Debug, Clone)]
pub(crate) struct SymbolIdDecoder {
    contexts: Vec<Context>,
    code_len: u32,
}

impl SymbolIdDecoder {
    pub(crate) fn new(code_len: u32) -> Self {
        Self {
            contexts: vec![Context::default(); 1 << code_len],
            code_len,
        }
    }

    pub(crate) fn decode(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> u32 {
        let mut prev = 1_u32;

        for _ in 0..self.code_len {
            let d = decoder.decode(&mut self.contexts[prev as usize]);
            prev = (prev << 1) | u32::from(d);
        }

        prev - (1 << self.code_len)
    }
}

/// The number of bits needed to code `count` different symbol IDs.
pub(crate) fn symbol_code_length(count: u32) -> u32 {
    32 - count.saturating_sub(1).leading_zeros()
}

#[cfg(test)]
use crate::arithmetic_decoder::ArithmeticEncoder;

#[cfg(test)]
impl IntegerDecoder {
    /// Encode `value` with the same contexts, `None` being the out-of-band value.
    pub(crate) fn encode(&mut self, encoder: &mut ArithmeticEncoder, value: Option<i32>) {
        let (negative, magnitude) = match value {
            None => (true, 0),
            Some(v) => (v < 0, i64::from(v).unsigned_abs()),
        };

        let (prefix, bits, base): (&[u32], u32, u64) = match magnitude {
            0..=3 => (&[0], 2, 0),
            4..=19 => (&[1, 0], 4, 4),
            20..=83 => (&[1, 1, 0], 6, 20),
            84..=339 => (&[1, 1, 1, 0], 8, 84),
            340..=4435 => (&[1, 1, 1, 1, 0], 12, 340),
            _ => (&[1, 1, 1, 1, 1], 32, 4436),
        };

        let mut prev = 1_u32;
        let offset = magnitude - base;
        let value_bits = (0..bits).rev().map(|i| ((offset >> i) & 1) as u32);

        for d in std::iter::once(u32::from(negative))
            .chain(prefix.iter().copied())
            .chain(value_bits)
        {
            encoder.encode(&mut self.contexts[prev as usize], d as u8);
            prev = if prev < 256 {
                (prev << 1) | d
            } else {
                (((prev << 1) | d) & 511) | 256
            };
        }
    }
}

#[cfg(test)]
impl SymbolIdDecoder {
    pub(crate) fn encode(&mut self, encoder: &mut ArithmeticEncoder, id: u32) {
        let mut prev = 1_u32;

        for i in (0..self.code_len).rev() {
            let d = (id >> i) & 1;
            encoder.encode(&mut self.contexts[prev as usize], d as u8);
            prev = (prev << 1) | d;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_lengths() {
        assert_eq!(symbol_code_length(0), 0);
        assert_eq!(symbol_code_length(1), 0);
        assert_eq!(symbol_code_length(2), 1);
        assert_eq!(symbol_code_length(3), 2);
        assert_eq!(symbol_code_length(256), 8);
        assert_eq!(symbol_code_length(257), 9);
    }

    #[test]
    fn zero_length_ids_decode_without_reading() {
        let mut decoder = ArithmeticDecoder::new(&[]);
        let mut ids = SymbolIdDecoder::new(0);

        assert_eq!(ids.decode(&mut decoder), 0);
        assert_eq!(ids.decode(&mut decoder), 0);
    }

    #[test]
    fn integers_of_every_range() {
        let values = [
            Some(0),
            Some(3),
            Some(-4),
            Some(19),
            Some(20),
            Some(-83),
            Some(339),
            Some(4435),
            Some(4436),
            Some(-100_000),
            None,
            Some(1),
        ];

        let mut encoder = ArithmeticEncoder::new();
        let mut ia = IntegerDecoder::new();
        for value in values {
            ia.encode(&mut encoder, value);
        }
        let data = encoder.finish();

        let mut decoder = ArithmeticDecoder::new(&data);
        let mut ia = IntegerDecoder::new();
        let decoded: Vec<_> = values.iter().map(|_| ia.decode(&mut decoder)).collect();
        assert_eq!(decoded, values);
    }

    #[test]
    fn symbol_ids_use_fixed_length_codes() {
        let mut encoder = ArithmeticEncoder::new();
        let mut iaid = SymbolIdDecoder::new(3);
        for id in [5, 0, 7, 2] {
            iaid.encode(&mut encoder, id);
        }
        let data = encoder.finish();

        let mut decoder = ArithmeticDecoder::new(&data);
        let mut iaid = SymbolIdDecoder::new(3);
        let ids: Vec<_> = (0..4).map(|_| iaid.decode(&mut decoder)).collect();
        assert_eq!(ids, [5, 0, 7, 2]);
    }
}
