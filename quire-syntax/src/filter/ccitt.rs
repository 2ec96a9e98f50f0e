use crate::config::DecodeSettings;
use crate::filter::{DecodeResult, Failure};
use crate::object::Dict;
use crate::object::keys::{
    BLACK_IS_1, COLUMNS, ENCODED_BYTE_ALIGN, END_OF_BLOCK, END_OF_LINE, K, ROWS,
};
use log::warn;
use quire_ccitt::EncodingMode;

pub(crate) fn decode(data: &[u8], params: &Dict, settings: &DecodeSettings) -> DecodeResult {
    let dp = quire_ccitt::DecodeSettings::default();
    let dimension = |key: &[u8], default: u32| {
        params
            .get_i64(key)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    };

    let k = params.get_i64(K).unwrap_or(0);
    let fax_settings = quire_ccitt::DecodeSettings {
        strict: false,
        columns: dimension(COLUMNS, dp.columns),
        rows: dimension(ROWS, dp.rows),
        end_of_block: params.get_bool(END_OF_BLOCK).unwrap_or(dp.end_of_block),
        end_of_line: params.get_bool(END_OF_LINE).unwrap_or(dp.end_of_line),
        rows_are_byte_aligned: params
            .get_bool(ENCODED_BYTE_ALIGN)
            .unwrap_or(dp.rows_are_byte_aligned),
        encoding: match k {
            ..0 => EncodingMode::Group4,
            0 => EncodingMode::Group3_1D,
            k => EncodingMode::Group3_2D {
                k: u32::try_from(k).unwrap_or(u32::MAX),
            },
        },
    };
    let black_is_1 = params.get_bool(BLACK_IS_1).unwrap_or(false);

    let mut sink = Sink {
        data: Vec::new(),
        completed: 0,
        limit: settings.max_decoded_size,
        overflow: false,
    };
    let result = quire_ccitt::decode(data, &mut sink, &fax_settings);

    if sink.overflow {
        return Err(Failure::size_limit());
    }

    // The fax decoder produces 1 for white pixels, which is what the filter
    // outputs unless `BlackIs1` is set.
    if black_is_1 {
        for byte in &mut sink.data {
            *byte = !*byte;
        }
    }

    match result {
        Ok(_) => Ok(sink.data),
        Err(e) => {
            warn!("ccitt decoding failed: {e}");
            sink.data.truncate(sink.completed);

            Err(Failure::corrupt(sink.data))
        }
    }
}

struct Sink {
    data: Vec<u8>,
    // The length of all completed rows.
    completed: usize,
    limit: usize,
    overflow: bool,
}

impl Sink {
    fn has_room(&mut self, count: usize) -> bool {
        if self.data.len() + count > self.limit {
            self.overflow = true;
        }

        !self.overflow
    }
}

impl quire_ccitt::Decoder for Sink {
    fn push_byte(&mut self, byte: u8) {
        if self.has_room(1) {
            self.data.push(byte);
        }
    }

    fn push_bytes(&mut self, byte: u8, count: usize) {
        if self.has_room(count) {
            self.data.resize(self.data.len() + count, byte);
        }
    }

    fn next_line(&mut self) {
        self.completed = self.data.len();
    }
}
