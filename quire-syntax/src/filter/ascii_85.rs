use crate::filter::{DecodeResult, Failure};
use crate::trivia::is_white_space_character;

pub(crate) fn decode(data: &[u8]) -> DecodeResult {
    let mut decoded = Vec::with_capacity(data.len() / 5 * 4 + 4);
    let mut group = [0_u8; 5];
    let mut len = 0;

    // Some writers omit the `<~` prefix, some don't.
    let body = data.strip_prefix(b"<~").unwrap_or(data);

    for &byte in body {
        match byte {
            b'~' => break,
            b if is_white_space_character(b) => {}
            b'z' if len == 0 => decoded.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[len] = byte - b'!';
                len += 1;

                if len == 5 {
                    let Some(word) = word_85(group) else {
                        return Err(Failure::corrupt(decoded));
                    };

                    decoded.extend_from_slice(&word);
                    len = 0;
                }
            }
            _ => return Err(Failure::corrupt(decoded)),
        }
    }

    match len {
        0 => {}
        // A single trailing symbol cannot encode a byte.
        1 => return Err(Failure::corrupt(decoded)),
        _ => {
            // Pad with the highest digit and drop the excess bytes.
            group[len..].fill(b'u' - b'!');

            let Some(word) = word_85(group) else {
                return Err(Failure::corrupt(decoded));
            };

            decoded.extend_from_slice(&word[..len - 1]);
        }
    }

    Ok(decoded)
}

fn word_85(digits: [u8; 5]) -> Option<[u8; 4]> {
    let q = digits
        .iter()
        .fold(0_u64, |acc, d| acc * 85 + u64::from(*d));
    // 85^5 > 256^4, the result might not fit in an u32.
    let r = u32::try_from(q).ok()?;

    Some(r.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::decode;

    #[test]
    fn decode_simple() {
        let input = b"87cURDZ~>";
        assert_eq!(decode(input).unwrap(), b"Hello");
    }

    #[test]
    fn decode_spaces() {
        let input = b"87  cURD\n  Z~>";
        assert_eq!(decode(input).unwrap(), b"Hello");
    }

    #[test]
    fn decode_zeroes() {
        let input = b"z~>";
        assert_eq!(decode(input).unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn decode_with_prefix_and_no_terminator() {
        assert_eq!(decode(b"<~87cURDZ").unwrap(), b"Hello");
    }

    #[test]
    fn overflowing_group_is_corrupt() {
        let failure = decode(b"87cUR uuuuu~>").unwrap_err();
        assert_eq!(failure.prefix, b"Hell");
    }
}
