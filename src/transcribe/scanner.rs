//! Streaming transcript extraction
//!
//! Transcription backends that stream results return a body holding one
//! or more concatenated JSON objects, each carrying partial `"text"` and
//! an `"is_final"` marker. A single forward pass extracts the last final
//! text (falling back to the last non-empty text) without materializing
//! the objects: every unrecognized value is skipped depth-aware so
//! nested braces and brackets never corrupt the outer object boundary.

/// Extract the transcript from a possibly multi-object response body
///
/// Returns the `"text"` of the last object marked `"is_final": true`,
/// else the last non-empty `"text"`, else `None`. Trailing garbage and
/// truncated objects end the scan without discarding earlier results.
#[must_use]
pub fn extract_transcript(body: &str) -> Option<String> {
    let mut scanner = Scanner::new(body);
    let mut last_text: Option<String> = None;
    let mut last_final_text: Option<String> = None;

    while scanner.seek_object_start() {
        let Some(object) = scanner.read_top_object() else {
            break;
        };

        if let Some(text) = object.text
            && !text.is_empty()
        {
            if object.is_final {
                last_final_text = Some(text.clone());
            }
            last_text = Some(text);
        }
    }

    last_final_text.or(last_text)
}

/// Fields recognized in a top-level object
struct TopObject {
    text: Option<String>,
    is_final: bool,
}

/// Single-pass cursor over the response bytes
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(body: &'a str) -> Self {
        Self {
            bytes: body.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    /// Advance to the next top-level `{`, returning false at end of input
    fn seek_object_start(&mut self) -> bool {
        while let Some(byte) = self.peek() {
            if byte == b'{' {
                return true;
            }
            self.pos += 1;
        }
        false
    }

    /// Read one top-level object, interpreting only `"text"`/`"is_final"`
    ///
    /// Entering the object resets both fields; every other value is
    /// structurally skipped. Returns `None` on malformed input.
    fn read_top_object(&mut self) -> Option<TopObject> {
        debug_assert_eq!(self.peek(), Some(b'{'));
        self.pos += 1;

        let mut object = TopObject {
            text: None,
            is_final: false,
        };

        loop {
            self.skip_whitespace();
            match self.peek()? {
                b'}' => {
                    self.pos += 1;
                    return Some(object);
                }
                b',' => {
                    self.pos += 1;
                }
                b'"' => {
                    let key = self.read_string()?;
                    self.skip_whitespace();
                    if self.peek()? != b':' {
                        return None;
                    }
                    self.pos += 1;
                    self.skip_whitespace();

                    match key.as_str() {
                        "text" if self.peek() == Some(b'"') => {
                            object.text = Some(self.read_string()?);
                        }
                        "is_final" => {
                            object.is_final = self.read_bool_or_skip()?;
                        }
                        _ => self.skip_value()?,
                    }
                }
                _ => return None,
            }
        }
    }

    /// Read a boolean literal; any other value is skipped as false
    fn read_bool_or_skip(&mut self) -> Option<bool> {
        if self.bytes[self.pos..].starts_with(b"true") {
            self.pos += 4;
            Some(true)
        } else if self.bytes[self.pos..].starts_with(b"false") {
            self.pos += 5;
            Some(false)
        } else {
            self.skip_value()?;
            Some(false)
        }
    }

    /// Skip any JSON value without interpreting it
    ///
    /// Strings are skipped escape-aware; objects and arrays are skipped
    /// by depth so nested braces inside them stay balanced; bare tokens
    /// (numbers, `true`, `false`, `null`) run to the next delimiter.
    fn skip_value(&mut self) -> Option<()> {
        match self.peek()? {
            b'"' => {
                self.read_string()?;
                Some(())
            }
            open @ (b'{' | b'[') => {
                let close = if open == b'{' { b'}' } else { b']' };
                let mut depth = 0usize;
                loop {
                    let byte = self.peek()?;
                    if byte == b'"' {
                        self.read_string()?;
                        continue;
                    }
                    self.pos += 1;
                    if byte == open {
                        depth += 1;
                    } else if byte == close {
                        depth -= 1;
                        if depth == 0 {
                            return Some(());
                        }
                    }
                }
            }
            _ => {
                while let Some(byte) = self.peek() {
                    if matches!(byte, b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r') {
                        break;
                    }
                    self.pos += 1;
                }
                Some(())
            }
        }
    }

    /// Read a string literal, fully unescaping it
    ///
    /// Handles `\" \\ \/ \b \f \n \r \t` and `\uXXXX`, including
    /// surrogate pairs. Returns `None` on truncated input.
    fn read_string(&mut self) -> Option<String> {
        debug_assert_eq!(self.peek(), Some(b'"'));
        self.pos += 1;

        let mut out = String::new();
        let mut run_start = self.pos;

        loop {
            let byte = self.peek()?;
            match byte {
                b'"' => {
                    out.push_str(std::str::from_utf8(&self.bytes[run_start..self.pos]).ok()?);
                    self.pos += 1;
                    return Some(out);
                }
                b'\\' => {
                    out.push_str(std::str::from_utf8(&self.bytes[run_start..self.pos]).ok()?);
                    self.pos += 1;
                    match self.peek()? {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            self.pos += 1;
                            out.push(self.read_unicode_escape()?);
                            run_start = self.pos;
                            continue;
                        }
                        other => {
                            // Unknown escape: keep the character as-is.
                            out.push(char::from(other));
                        }
                    }
                    self.pos += 1;
                    run_start = self.pos;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Read the 4 hex digits after `\u`, combining surrogate pairs
    ///
    /// Positioned just past the `u`; leaves the cursor after the last
    /// consumed digit (or after the low surrogate's digits).
    fn read_unicode_escape(&mut self) -> Option<char> {
        let high = self.read_hex4()?;

        if (0xD800..=0xDBFF).contains(&high) {
            if self.bytes[self.pos..].starts_with(b"\\u") {
                self.pos += 2;
                let low = self.read_hex4()?;
                if (0xDC00..=0xDFFF).contains(&low) {
                    let combined =
                        0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
                    return char::from_u32(combined).or(Some('\u{FFFD}'));
                }
                return Some('\u{FFFD}');
            }
            return Some('\u{FFFD}');
        }

        char::from_u32(u32::from(high)).or(Some('\u{FFFD}'))
    }

    fn read_hex4(&mut self) -> Option<u16> {
        let digits = self.bytes.get(self.pos..self.pos + 4)?;
        let value = u16::from_str_radix(std::str::from_utf8(digits).ok()?, 16).ok()?;
        self.pos += 4;
        Some(value)
    }
}
