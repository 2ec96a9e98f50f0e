use crate::filter::{DecodeResult, Failure};
use crate::object::hex_value;
use crate::trivia::is_white_space_character;

pub(crate) fn decode(data: &[u8]) -> DecodeResult {
    let mut decoded = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    // We are lenient and don't require a > in the stream.
    for &byte in data {
        if byte == b'>' {
            break;
        }

        if is_white_space_character(byte) {
            continue;
        }

        let Some(value) = hex_value(byte) else {
            return Err(Failure::corrupt(decoded));
        };

        match high.take() {
            Some(h) => decoded.push(h << 4 | value),
            None => high = Some(value),
        }
    }

    // An odd number of digits is padded with 0.
    if let Some(h) = high {
        decoded.push(h << 4);
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::decode;

    #[test]
    fn decode_simple() {
        let input = b"AF3E2901>";
        assert_eq!(decode(input).unwrap(), vec![0xaf, 0x3e, 0x29, 0x01]);
    }

    #[test]
    fn decode_whitespaces() {
        let input = b"AF3   E2 \r\n  901>";
        assert_eq!(decode(input).unwrap(), vec![0xaf, 0x3e, 0x29, 0x01]);
    }

    #[test]
    fn decode_without_gt() {
        assert_eq!(decode(b"af3e").unwrap(), vec![0xaf, 0x3e]);
    }

    #[test]
    fn decode_with_padding() {
        let input = b"AF3E291>";
        assert_eq!(decode(input).unwrap(), vec![0xaf, 0x3e, 0x29, 0x10]);
    }

    #[test]
    fn garbage_keeps_prefix() {
        let failure = decode(b"0102x03>").unwrap_err();
        assert_eq!(failure.prefix, vec![0x01, 0x02]);
    }
}
