use crate::config::DecodeSettings;
use crate::filter::predictor::{self, PredictorParams};
use crate::filter::{DecodeResult, Failure};
use crate::object::Dict;
use log::warn;
use quire_common::bit::BitReader;

const CLEAR_TABLE: usize = 256;
const EOD: usize = 257;
const MAX_ENTRIES: usize = 4096;
const INITIAL_SIZE: usize = 258;
// How many codes are read between two cancellation checks.
const CHECK_INTERVAL: usize = 4096;

pub(crate) fn decode(data: &[u8], params: &Dict, settings: &DecodeSettings) -> DecodeResult {
    let params = PredictorParams::from_params(params);
    let decoded = decode_impl(data, params.early_change, settings)?;

    predictor::apply(decoded, &params)
}

fn decode_impl(data: &[u8], early_change: bool, settings: &DecodeSettings) -> DecodeResult {
    let mut table = Table::new(early_change);

    let mut reader = BitReader::new(data);
    let mut decoded = vec![];
    let mut prev: Option<usize> = None;
    let mut codes = 0_usize;

    loop {
        codes += 1;

        if codes % CHECK_INTERVAL == 0 {
            if settings.cancel.is_cancelled() {
                return Err(Failure::cancelled());
            }

            if decoded.len() > settings.max_decoded_size {
                return Err(Failure::size_limit());
            }
        }

        let Some(next) = reader.read(table.code_length()) else {
            // A missing EOD marker is tolerated.
            return Ok(decoded);
        };

        match next as usize {
            CLEAR_TABLE => {
                table.clear();
                prev = None;
            }
            EOD => return Ok(decoded),
            new => {
                if let Some(entry) = table.get(new) {
                    decoded.extend_from_slice(entry);
                    let first = entry[0];

                    if let Some(prev) = prev {
                        table.register(prev, first);
                    }
                } else {
                    // The code that is about to be defined: the previous
                    // entry plus its own first byte.
                    let Some(prev) = prev.filter(|_| new == table.len()) else {
                        warn!("invalid lzw code {new}");

                        return Err(Failure::corrupt(decoded));
                    };

                    let Some(first) = table.get(prev).map(|e| e[0]) else {
                        return Err(Failure::corrupt(decoded));
                    };

                    table.register(prev, first);

                    match table.get(new) {
                        Some(entry) => decoded.extend_from_slice(entry),
                        None => return Err(Failure::corrupt(decoded)),
                    }
                }

                prev = Some(new);
            }
        }
    }
}

struct Table {
    early_change: bool,
    entries: Vec<Vec<u8>>,
}

impl Table {
    fn new(early_change: bool) -> Self {
        let mut entries: Vec<_> = (0..=255).map(|b| vec![b]).collect();

        // Clear table and EOD don't have any data.
        entries.push(vec![0]);
        entries.push(vec![0]);

        Self {
            early_change,
            entries,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn register(&mut self, prev: usize, new_byte: u8) {
        // A full table stays as it is until the next clear code.
        if self.entries.len() >= MAX_ENTRIES {
            return;
        }

        let Some(prev_entry) = self.get(prev) else {
            return;
        };

        let mut new_entry = Vec::with_capacity(prev_entry.len() + 1);
        new_entry.extend_from_slice(prev_entry);
        new_entry.push(new_byte);
        self.entries.push(new_entry);
    }

    fn get(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(|v| &**v)
    }

    fn clear(&mut self) {
        self.entries.truncate(INITIAL_SIZE);
    }

    fn code_length(&self) -> u8 {
        const TEN: usize = 512;
        const ELEVEN: usize = 1024;
        const TWELVE: usize = 2048;

        let adjusted = self.entries.len() + usize::from(self.early_change);

        if adjusted >= TWELVE {
            12
        } else if adjusted >= ELEVEN {
            11
        } else if adjusted >= TEN {
            10
        } else {
            9
        }
    }
}
