/// Decode a Modified UTF-8 (MUTF-8) byte sequence into a Rust String.
///
/// MUTF-8 differs from standard UTF-8 in two ways:
/// - U+0000 is encoded as 0xC0 0x80
/// - supplementary characters are encoded as a surrogate pair, each half as a
///   3-byte sequence
///
/// Malformed sequences decode to U+FFFD rather than failing; the raw bytes are
/// always kept alongside for round-tripping.
pub fn decode_mutf8(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len());
    let mut pos = 0;

    while pos < data.len() {
        let b = data[pos];
        if b & 0x80 == 0 {
            result.push(b as char);
            pos += 1;
        } else if b & 0xe0 == 0xc0 {
            match data.get(pos + 1) {
                Some(&b2) if b2 & 0xc0 == 0x80 => {
                    let cp = ((b as u32 & 0x1f) << 6) | (b2 as u32 & 0x3f);
                    result.push(char::from_u32(cp).unwrap_or('\u{FFFD}'));
                    pos += 2;
                }
                _ => {
                    result.push('\u{FFFD}');
                    pos += 1;
                }
            }
        } else if b & 0xf0 == 0xe0 {
            let Some(cp) = three_byte(data, pos) else {
                result.push('\u{FFFD}');
                pos += 1;
                continue;
            };
            if (0xD800..=0xDBFF).contains(&cp) {
                if let Some(low) = three_byte(data, pos + 3).filter(|c| (0xDC00..=0xDFFF).contains(c)) {
                    let supplementary = 0x10000 + ((cp - 0xD800) << 10) + (low - 0xDC00);
                    result.push(char::from_u32(supplementary).unwrap_or('\u{FFFD}'));
                    pos += 6;
                    continue;
                }
                result.push('\u{FFFD}');
            } else {
                result.push(char::from_u32(cp).unwrap_or('\u{FFFD}'));
            }
            pos += 3;
        } else {
            result.push('\u{FFFD}');
            pos += 1;
        }
    }

    result
}

fn three_byte(data: &[u8], pos: usize) -> Option<u32> {
    let b1 = *data.get(pos)?;
    let b2 = *data.get(pos + 1)?;
    let b3 = *data.get(pos + 2)?;
    if b1 & 0xf0 != 0xe0 || b2 & 0xc0 != 0x80 || b3 & 0xc0 != 0x80 {
        return None;
    }
    Some(((b1 as u32 & 0x0f) << 12) | ((b2 as u32 & 0x3f) << 6) | (b3 as u32 & 0x3f))
}

/// Encode a string as Modified UTF-8.
pub fn encode_mutf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | ((unit >> 6) as u8 & 0x1f));
                out.push(0x80 | (unit as u8 & 0x3f));
            }
            _ => {
                out.push(0xe0 | ((unit >> 12) as u8 & 0x0f));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3f));
                out.push(0x80 | (unit as u8 & 0x3f));
            }
        }
    }
    out
}
