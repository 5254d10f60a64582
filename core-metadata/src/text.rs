//! Text frame decoding and sanitisation.

/// Text encoding selected by the first byte of a text or picture frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Latin1,
    /// UTF-16 with byte order mark; little-endian when the mark is missing.
    Utf16,
    Utf16Be,
    Utf8,
}

impl TextEncoding {
    /// Unknown encoding bytes fall back to Latin-1.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => TextEncoding::Utf16,
            2 => TextEncoding::Utf16Be,
            3 => TextEncoding::Utf8,
            _ => TextEncoding::Latin1,
        }
    }

    /// Width of the string terminator in this encoding.
    pub fn terminator_len(&self) -> usize {
        match self {
            TextEncoding::Utf16 | TextEncoding::Utf16Be => 2,
            TextEncoding::Latin1 | TextEncoding::Utf8 => 1,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Utf16 => match bytes {
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, false),
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, true),
                _ => decode_utf16(bytes, false),
            },
            TextEncoding::Utf16Be => decode_utf16(bytes, true),
        }
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> String {
    let units = bytes.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });

    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Whether a character survives sanitisation: printable ASCII, CJK
/// ideographs, CJK symbols and punctuation, and full-width forms.
pub fn is_displayable(c: char) -> bool {
    matches!(c,
        '\u{0020}'..='\u{007E}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{3000}'..='\u{303F}'
        | '\u{FF01}'..='\u{FF5E}')
}

/// Drops every non-displayable character and trims trailing whitespace.
pub fn sanitize(text: &str) -> String {
    let kept: String = text.chars().filter(|&c| is_displayable(c)).collect();
    kept.trim_end().to_string()
}

/// Decodes a whole text frame payload: encoding byte, then the value.
pub fn decode_text_frame(payload: &[u8]) -> String {
    match payload.split_first() {
        Some((&encoding, value)) => sanitize(&TextEncoding::from_byte(encoding).decode(value)),
        None => String::new(),
    }
}
