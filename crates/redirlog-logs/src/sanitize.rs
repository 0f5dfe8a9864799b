use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::GBK;
use regex::Regex;

/// ESC followed by a CSI `[ ... final-byte` sequence, or by one control character
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|[@-Z\\-_])").expect("ANSI pattern is valid")
});

/// Decode one raw output line.
///
/// UTF-8 first, then strict GBK. Bytes that are neither are decoded lossily.
pub fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(text);
    }
    match GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(decoded) => decoded,
        None => String::from_utf8_lossy(bytes),
    }
}

/// Undo a Latin-1 mis-decode of UTF-8 text.
///
/// Text that was read as Latin-1 has every char in `U+0000..=U+00FF`. Those
/// chars are the original bytes and are re-decoded as UTF-8. Text whose
/// bytes are not valid UTF-8, such as correctly decoded accented words,
/// comes back unchanged.
pub fn repair_encoding(text: &str) -> Cow<'_, str> {
    if text.is_ascii() || text.chars().any(|c| u32::from(c) > 0xFF) {
        return Cow::Borrowed(text);
    }

    let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    match String::from_utf8(bytes) {
        Ok(utf8) => Cow::Owned(utf8),
        Err(_) => Cow::Borrowed(text),
    }
}

/// Remove ANSI terminal escape sequences
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Escape the characters that are unsafe inside HTML text
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_latin1(s: &str) -> String {
        s.bytes().map(char::from).collect()
    }

    #[test]
    fn test_repair_utf8_misdecode() {
        let garbled = as_latin1("报告.pdf");
        assert_ne!(garbled, "报告.pdf");
        assert_eq!(repair_encoding(&garbled), "报告.pdf");
    }

    #[test]
    fn test_repair_leaves_good_text_alone() {
        assert!(matches!(repair_encoding("plain ascii"), Cow::Borrowed(_)));
        assert_eq!(repair_encoding("已经正确"), "已经正确");
        assert_eq!(repair_encoding("caf\u{e9}\u{ff}"), "caf\u{e9}\u{ff}");
        assert_eq!(
            repair_encoding("Error: Müller upload failed"),
            "Error: Müller upload failed"
        );
        assert_eq!(repair_encoding("año señor"), "año señor");
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line("Error: Müller".as_bytes()), "Error: Müller");

        let (gbk, _, _) = GBK.encode("Error: 文件不存在");
        assert!(std::str::from_utf8(&gbk).is_err());
        assert_eq!(decode_line(&gbk), "Error: 文件不存在");

        assert_eq!(decode_line(b"bad \xff byte"), "bad \u{FFFD} byte");
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(
            strip_ansi("\x1b[32mINFO\x1b[0m:     Uvicorn running"),
            "INFO:     Uvicorn running"
        );
        assert_eq!(strip_ansi("\x1b[1;31mred\x1b[m \x1bMx"), "red x");
        assert_eq!(strip_ansi("no escapes"), "no escapes");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
        assert!(matches!(escape_html("safe"), Cow::Borrowed(_)));
    }
}
