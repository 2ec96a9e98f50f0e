use crate::DecodeError;
use crate::states::{
    BLACK_RUNS, EOL, LEAF, MODES, Mode, NONE, Node, VALUE, WHITE_RUNS, mode_from_value,
};
use quire_common::bit::BitReader;

/// Code-level reading on top of the plain bit reader.
pub(crate) trait CodeReader {
    fn walk(&mut self, nodes: &[Node]) -> Result<u16, DecodeError>;
    fn decode_run(&mut self, is_white: bool) -> Result<usize, DecodeError>;
    fn decode_mode(&mut self) -> Result<Mode, DecodeError>;
    fn skip_eols(&mut self) -> usize;
    fn next_bit(&mut self) -> Result<bool, DecodeError>;
}

impl CodeReader for BitReader<'_> {
    fn walk(&mut self, nodes: &[Node]) -> Result<u16, DecodeError> {
        let mut node = 0;

        loop {
            let bit = self.read_bit().ok_or(DecodeError::UnexpectedEof)?;
            let next = if bit == 0 {
                nodes[node].zero
            } else {
                nodes[node].one
            };

            if next == NONE {
                return Err(DecodeError::InvalidCode);
            }

            if next & LEAF != 0 {
                return Ok(next & VALUE);
            }

            node = next as usize;
        }
    }

    fn decode_run(&mut self, is_white: bool) -> Result<usize, DecodeError> {
        let nodes: &[Node] = if is_white { &WHITE_RUNS } else { &BLACK_RUNS };
        let mut total: usize = 0;

        loop {
            let len = self.walk(nodes)? as usize;
            total = total.checked_add(len).ok_or(DecodeError::Overflow)?;

            // Make-up codes are multiples of 64 and are always followed by
            // another code.
            if len < 64 {
                return Ok(total);
            }
        }
    }

    fn decode_mode(&mut self) -> Result<Mode, DecodeError> {
        let value = self.walk(&MODES)?;

        mode_from_value(value).ok_or(DecodeError::InvalidCode)
    }

    fn skip_eols(&mut self) -> usize {
        let mut count = 0;

        while self.peek(12) == Some(EOL) {
            self.skip(12);
            count += 1;
        }

        count
    }

    fn next_bit(&mut self) -> Result<bool, DecodeError> {
        self.read_bit()
            .map(|b| b == 1)
            .ok_or(DecodeError::UnexpectedEof)
    }
}
