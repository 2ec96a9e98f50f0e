use crate::filter::DecodeResult;
use log::warn;
use quire_common::byte::Reader;

pub(crate) fn decode(data: &[u8]) -> DecodeResult {
    let mut reader = Reader::new(data);
    let mut decoded = vec![];

    if decode_inner(&mut reader, &mut decoded).is_none() {
        warn!("run-length decode stream ended prematurely");
    }

    Ok(decoded)
}

fn decode_inner(reader: &mut Reader<'_>, decoded: &mut Vec<u8>) -> Option<()> {
    loop {
        let length = reader.read_byte()?;

        match length {
            128 => return Some(()),
            0..=127 => {
                let wanted = length as usize + 1;
                // Keep what is there of a truncated literal run.
                let available = wanted.min(reader.remaining());
                decoded.extend_from_slice(reader.read_bytes(available)?);

                if available < wanted {
                    return None;
                }
            }
            _ => {
                let length = 257 - length as usize;
                let byte = reader.read_byte()?;
                decoded.resize(decoded.len() + length, byte);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::decode;

    #[test]
    fn run_length() {
        let input = vec![4, 10, 11, 12, 13, 14, 253, 3, 128];
        assert_eq!(
            decode(&input).unwrap(),
            vec![10, 11, 12, 13, 14, 3, 3, 3, 3]
        );
    }

    #[test]
    fn truncated_literal_run() {
        assert_eq!(decode(&[5, 1, 2]).unwrap(), vec![1, 2]);
    }
}
