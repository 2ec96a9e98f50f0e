use crate::filter::{DecodeResult, Failure};
use crate::object::Dict;
use crate::object::keys::COLOR_TRANSFORM;
use log::warn;
use std::io::Cursor;
use zune_jpeg::JpegDecoder;
use zune_jpeg::zune_core::colorspace::ColorSpace;
use zune_jpeg::zune_core::options::DecoderOptions;

pub(crate) fn decode(data: &[u8], params: &Dict) -> DecodeResult {
    let options = DecoderOptions::default()
        .set_max_width(u16::MAX as usize)
        .set_max_height(u16::MAX as usize);

    let mut decoder = JpegDecoder::new_with_options(Cursor::new(data), options);

    if let Err(e) = decoder.decode_headers() {
        warn!("failed to read jpeg headers: {e:?}");

        return Err(Failure::corrupt(Vec::new()));
    }

    let markers = scan_markers(data).unwrap_or_default();
    let color_transform = params.get_i64(COLOR_TRANSFORM);

    let mut out_colorspace = match decoder.input_colorspace() {
        Some(ColorSpace::YCbCr) => {
            if !markers.adobe && markers.component_ids.starts_with(b"RGB") {
                // The data is RGB, but the decoder registers it as YCbCr.
                // Asking for YCbCr keeps it from applying the transform.
                ColorSpace::YCbCr
            } else if color_transform.is_none_or(|c| c == 1) {
                ColorSpace::RGB
            } else {
                ColorSpace::YCbCr
            }
        }
        Some(ColorSpace::Luma | ColorSpace::LumaA) => ColorSpace::Luma,
        Some(ColorSpace::CMYK) => ColorSpace::CMYK,
        Some(ColorSpace::YCCK) => ColorSpace::YCCK,
        _ => ColorSpace::RGB,
    };

    decoder.set_options(options.jpeg_set_out_colorspace(out_colorspace));

    let mut decoded = match decoder.decode() {
        Ok(decoded) => decoded,
        Err(_) => {
            // An APP14 marker may make the decoder pick an input colorspace
            // that conflicts with the requested one, so retry with another.
            out_colorspace = if matches!(out_colorspace, ColorSpace::YCCK | ColorSpace::CMYK) {
                ColorSpace::RGB
            } else {
                ColorSpace::CMYK
            };

            let mut decoder = JpegDecoder::new_with_options(
                Cursor::new(data),
                options.jpeg_set_out_colorspace(out_colorspace),
            );

            decoder.decode().map_err(|e| {
                warn!("failed to decode jpeg: {e:?}");

                Failure::corrupt(Vec::new())
            })?
        }
    };

    if out_colorspace == ColorSpace::YCCK {
        for c in decoded.chunks_exact_mut(4) {
            let y = c[0] as f32;
            let cb = c[1] as f32;
            let cr = c[2] as f32;
            c[0] = (434.456 - y - 1.402 * cr) as u8;
            c[1] = (119.541 - y + 0.344 * cb + 0.714 * cr) as u8;
            c[2] = (481.816 - y - 1.772 * cb) as u8;
        }
    }

    Ok(decoded)
}

#[derive(Debug, Default)]
struct Markers {
    adobe: bool,
    component_ids: Vec<u8>,
}

/// Read the APP14 marker and the frame component ids.
fn scan_markers(data: &[u8]) -> Option<Markers> {
    if data.get(0..2)? != [0xFF, 0xD8] {
        return None;
    }

    let mut markers = Markers::default();
    let mut pos = 2;

    while pos + 3 < data.len() {
        if data[pos] != 0xFF {
            return None;
        }

        let marker = data[pos + 1];

        if marker == 0xFF {
            pos += 1;
            continue;
        }

        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 || marker == 0xDA {
            break;
        }

        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let segment = data.get(pos + 4..pos + 2 + length)?;

        if marker == 0xEE && segment.starts_with(b"Adobe") {
            markers.adobe = true;
        }

        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            let count = *segment.get(5)? as usize;

            markers.component_ids = (0..count)
                .filter_map(|i| segment.get(6 + i * 3).copied())
                .collect();
        }

        pos += 2 + length;
    }

    Some(markers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_of_rgb_frame() {
        let data = [
            0xFF, 0xD8, // SOI
            0xFF, 0xC0, 0x00, 0x11, 8, 0, 1, 0, 1, 3, // SOF0
            b'R', 0x11, 0, b'G', 0x11, 0, b'B', 0x11, 0, //
            0xFF, 0xDA,
        ];
        let markers = scan_markers(&data).unwrap();

        assert!(!markers.adobe);
        assert_eq!(markers.component_ids, b"RGB");
    }

    #[test]
    fn garbage_is_corrupt() {
        let failure = decode(b"not a jpeg", &Dict::new()).unwrap_err();
        assert!(failure.prefix.is_empty());
    }
}
