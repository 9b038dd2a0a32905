//! Classic command-log parser
//!
//! Serial captures from printer emulators are a stream of JSON records, one
//! per protocol packet: `{"command":"INIT"}`, `{"command":"DATA",
//! "compressed":0, "data":"3C 7E ..."}`, `{"command":"PRNT", ...}` and so
//! on. Some firmwares log the raw command byte instead of a name
//! (1 = init, 2 = print, 4 = data). Records are reassembled in packet order;
//! each print command closes the image buffered so far.

use serde::Deserialize;

use super::{collect_matrix, FormatError, TransformResult, Warning, CLASSIC_MARKER};

/// One logged protocol packet. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    command: CommandId,
    #[serde(default)]
    data: Option<DataPayload>,
    #[serde(default)]
    compressed: Option<Flag>,
}

/// Command discriminator: either a name or the raw protocol byte.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandId {
    Code(u8),
    Name(String),
}

/// DATA payloads appear as hex strings or plain byte arrays.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataPayload {
    Text(String),
    Bytes(Vec<u8>),
}

/// Boolean flags logged as JSON bools or 0/1 numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Num(u8),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Num(n) => *n != 0,
        }
    }
}

enum Command {
    Init,
    Data,
    Print,
    Other,
}

impl CommandId {
    fn classify(&self) -> Command {
        match self {
            CommandId::Code(1) => Command::Init,
            CommandId::Code(2) => Command::Print,
            CommandId::Code(4) => Command::Data,
            CommandId::Code(_) => Command::Other,
            CommandId::Name(name) => match name.to_ascii_uppercase().as_str() {
                "INIT" => Command::Init,
                "DATA" => Command::Data,
                "PRNT" | "PRINT" => Command::Print,
                _ => Command::Other,
            },
        }
    }
}

/// Parse a classic command-log capture into tile matrices.
///
/// Malformed or truncated records are skipped with a warning; parsing
/// resumes at the next `{"command"` marker. Fails only when not a single
/// record can be recovered.
pub fn transform_classic(data: &str, file_name: &str) -> Result<TransformResult, FormatError> {
    let mut result = TransformResult::default();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parsed = 0usize;

    let mut search_from = 0;
    while let Some(offset) = data[search_from..].find(CLASSIC_MARKER) {
        let start = search_from + offset;
        let line = data[..start].matches('\n').count() + 1;

        let Some(end) = record_end(data, start) else {
            result.warnings.push(Warning {
                message: "truncated command record".to_string(),
                line,
            });
            // Recover the same way as malformed JSON: later records may
            // still be intact
            search_from = start + CLASSIC_MARKER.len();
            continue;
        };

        let raw = &data[start..end];
        search_from = end;

        let record: CommandRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(err) => {
                result.warnings.push(Warning {
                    message: format!("skipping malformed record: {err}"),
                    line,
                });
                // Resume right after the marker so nested or overlapping
                // garbage cannot swallow the next record
                search_from = start + CLASSIC_MARKER.len();
                continue;
            }
        };
        parsed += 1;

        match record.command.classify() {
            Command::Init => buffer.clear(),
            Command::Data => {
                let compressed = record.compressed.as_ref().is_some_and(Flag::is_set);
                match decode_payload(record.data, compressed) {
                    Ok(bytes) => buffer.extend_from_slice(&bytes),
                    Err(message) => {
                        result.warnings.push(Warning { message, line });
                    }
                }
            }
            Command::Print => {
                if let Some(matrix) = collect_matrix(&buffer, line, &mut result.warnings) {
                    result.matrices.push(matrix);
                }
                buffer.clear();
            }
            Command::Other => {}
        }
    }

    if parsed == 0 {
        return Err(FormatError::NoValidRecords {
            file_name: file_name.to_string(),
        });
    }

    // An unterminated capture still holds one image worth of packets
    if !buffer.is_empty() {
        let line = data.matches('\n').count() + 1;
        if let Some(matrix) = collect_matrix(&buffer, line, &mut result.warnings) {
            result.matrices.push(matrix);
        }
    }

    Ok(result)
}

/// Find the end of the JSON object starting at `start`, honoring strings
/// and escapes. Returns `None` for records truncated before their closing
/// brace.
fn record_end(data: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in data[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a DATA payload into raw tile bytes, expanding the printer's RLE
/// scheme when the compressed flag is set.
fn decode_payload(payload: Option<DataPayload>, compressed: bool) -> Result<Vec<u8>, String> {
    let bytes = match payload {
        None => return Ok(Vec::new()),
        Some(DataPayload::Bytes(bytes)) => bytes,
        Some(DataPayload::Text(text)) => parse_hex(&text)?,
    };
    if compressed {
        expand_rle(&bytes)
    } else {
        Ok(bytes)
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        let token = token.strip_prefix("0x").unwrap_or(token);
        let byte = u8::from_str_radix(token, 16)
            .map_err(|_| format!("skipping record with invalid hex byte '{token}'"))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

/// Printer RLE: a length byte with the high bit set repeats the following
/// byte `(n & 0x7F) + 2` times; otherwise the next `n + 1` bytes are
/// literal.
fn expand_rle(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let n = bytes[i];
        if n & 0x80 != 0 {
            let Some(&value) = bytes.get(i + 1) else {
                return Err("skipping record with truncated run".to_string());
            };
            out.extend(std::iter::repeat(value).take(usize::from(n & 0x7F) + 2));
            i += 2;
        } else {
            let count = usize::from(n) + 1;
            let Some(literal) = bytes.get(i + 1..i + 1 + count) else {
                return Err("skipping record with truncated literal block".to_string());
            };
            out.extend_from_slice(literal);
            i += 1 + count;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::{FRAME_TILES_HIGH, FRAME_TILES_WIDE, TILE_BYTES};

    fn data_record(bytes: &[u8]) -> String {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
        format!(
            r#"{{"command":"DATA","compressed":0,"more":0,"data":"{}"}}"#,
            hex.join(" ")
        )
    }

    #[test]
    fn test_full_frame_yields_single_matrix() {
        // 360 tiles in packets of two tile rows, like real printer traffic
        let mut text = String::from("{\"command\":\"INIT\"}\n");
        let packet = vec![0x55u8; FRAME_TILES_WIDE * 2 * TILE_BYTES];
        for _ in 0..(FRAME_TILES_HIGH / 2) {
            text.push_str(&data_record(&packet));
            text.push('\n');
        }
        text.push_str(r#"{"command":"PRNT","sheets":1}"#);

        let result = transform_classic(&text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
        assert_eq!(result.matrices[0].width(), 160);
        assert_eq!(result.matrices[0].height(), 144);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_numeric_commands() {
        let tile = vec![0xAAu8; TILE_BYTES];
        let hex: Vec<String> = tile.iter().map(|b| format!("{b:02X}")).collect();
        let data_line = format!(r#"{{"command":4,"data":"{}"}}"#, hex.join(" "));
        let text = format!("{}\n{}\n{}", r#"{"command":1}"#, data_line, r#"{"command":2}"#);
        let result = transform_classic(&text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
        assert_eq!(result.matrices[0].width(), 8);
    }

    #[test]
    fn test_print_splits_images() {
        let tile = vec![0x11u8; TILE_BYTES];
        let text = format!(
            "{}\n{}\n{}\n{}",
            data_record(&tile),
            r#"{"command":"PRNT"}"#,
            data_record(&tile),
            r#"{"command":"PRNT"}"#
        );
        let result = transform_classic(&text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 2);
    }

    #[test]
    fn test_init_resets_buffer() {
        let tile = vec![0x22u8; TILE_BYTES];
        let text = format!(
            "{}\n{}\n{}\n{}",
            data_record(&tile),
            r#"{"command":"INIT"}"#,
            data_record(&tile),
            r#"{"command":"PRNT"}"#
        );
        let result = transform_classic(&text, "serial.txt").unwrap();
        // First DATA was discarded by INIT
        assert_eq!(result.matrices.len(), 1);
        assert_eq!(result.matrices[0].height(), 8);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let tile = vec![0x33u8; TILE_BYTES];
        let text = format!(
            "{}\n{}\n{}",
            r#"{"command":"DATA","data":"not hex at all"}"#,
            data_record(&tile),
            r#"{"command":"PRNT"}"#
        );
        let result = transform_classic(&text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].line, 1);
    }

    #[test]
    fn test_truncated_record_stops_cleanly() {
        let tile = vec![0x44u8; TILE_BYTES];
        let text = format!(
            "{}\n{}\n{}",
            data_record(&tile),
            r#"{"command":"PRNT"}"#,
            r#"{"command":"DATA","data":"00 11"#
        );
        let result = transform_classic(&text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("truncated")));
    }

    #[test]
    fn test_midfile_truncated_record_recovers() {
        // A record missing its closing brace swallows the rest of the file
        // in one balanced-brace scan; parsing must resume at the next marker
        let tile = vec![0x66u8; TILE_BYTES];
        let text = format!(
            "{}\n{}\n{}",
            r#"{"command":1"#,
            data_record(&tile),
            r#"{"command":"PRNT"}"#
        );
        let result = transform_classic(&text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
        assert_eq!(result.matrices[0].height(), 8);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("truncated")));
    }

    #[test]
    fn test_no_valid_records_fails() {
        let err = transform_classic(r#"{"command" garbage"#, "bad.txt").unwrap_err();
        assert_eq!(
            err,
            FormatError::NoValidRecords {
                file_name: "bad.txt".to_string()
            }
        );
    }

    #[test]
    fn test_unterminated_capture_flushes_final_image() {
        let tile = vec![0x55u8; TILE_BYTES];
        let result = transform_classic(&data_record(&tile), "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
    }

    #[test]
    fn test_compressed_payload_expansion() {
        // 0x8E: run of 16 copies of the next byte - exactly one tile
        let text = r#"{"command":"DATA","compressed":1,"data":"8E 3C"}{"command":"PRNT"}"#;
        let result = transform_classic(text, "serial.txt").unwrap();
        assert_eq!(result.matrices.len(), 1);
        assert_eq!(result.matrices[0].width(), 8);
    }

    #[test]
    fn test_expand_rle_literals_and_runs() {
        // literal block of 3, then a run of 4
        let expanded = expand_rle(&[0x02, 0xAA, 0xBB, 0xCC, 0x82, 0x11]).unwrap();
        assert_eq!(expanded, vec![0xAA, 0xBB, 0xCC, 0x11, 0x11, 0x11, 0x11]);
    }

    #[test]
    fn test_expand_rle_truncated() {
        assert!(expand_rle(&[0x05, 0xAA]).is_err());
        assert!(expand_rle(&[0x82]).is_err());
    }
}
