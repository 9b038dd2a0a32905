//! Free-form capture dump parser
//!
//! Dumps from WiFi/SD capture devices are lines of hex bytes with arbitrary
//! separator text between images (device banners, timestamps, empty lines
//! from the terminal). Any line that is not plain hex bytes acts as an image
//! boundary; a full 160x144 frame's worth of bytes also closes an image, so
//! back-to-back frames without separators still split correctly.

use std::sync::OnceLock;

use regex::Regex;

use super::{collect_matrix, FormatError, TransformResult};
use crate::tiles::FRAME_BYTES;

fn hex_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:0x)?[0-9A-Fa-f]{2}(?:[\s,]+(?:0x)?[0-9A-Fa-f]{2})*[\s,]*$")
            .expect("hex line pattern is valid")
    })
}

/// Parse a free-form capture dump into tile matrices.
///
/// Fails with [`FormatError::NoValidData`] when no hex byte line is found
/// anywhere in the input; otherwise undersized fragments are dropped with
/// warnings and every complete capture becomes one matrix.
pub fn transform_capture(data: &str, file_name: &str) -> Result<TransformResult, FormatError> {
    let mut result = TransformResult::default();
    let mut buffer: Vec<u8> = Vec::new();
    let mut bytes_seen = 0usize;
    let mut last_line = 1;

    for (index, raw_line) in data.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if hex_line().is_match(trimmed) {
            for token in trimmed.split(|c: char| c.is_whitespace() || c == ',') {
                if token.is_empty() {
                    continue;
                }
                let token = token.strip_prefix("0x").unwrap_or(token);
                // The regex guarantees two hex digits per token
                if let Ok(byte) = u8::from_str_radix(token, 16) {
                    buffer.push(byte);
                    bytes_seen += 1;
                }
            }
            last_line = line;

            // Cut at frame granularity so unseparated consecutive frames
            // still come out as individual images
            while buffer.len() >= FRAME_BYTES {
                let rest = buffer.split_off(FRAME_BYTES);
                if let Some(matrix) = collect_matrix(&buffer, line, &mut result.warnings) {
                    result.matrices.push(matrix);
                }
                buffer = rest;
            }
        } else {
            // Boundary marker: close the image collected so far
            if !buffer.is_empty() {
                if let Some(matrix) = collect_matrix(&buffer, line, &mut result.warnings) {
                    result.matrices.push(matrix);
                }
                buffer.clear();
            }
        }
    }

    if bytes_seen == 0 {
        return Err(FormatError::NoValidData {
            file_name: file_name.to_string(),
        });
    }

    if !buffer.is_empty() {
        if let Some(matrix) = collect_matrix(&buffer, last_line, &mut result.warnings) {
            result.matrices.push(matrix);
        }
    }

    Ok(result)
}
