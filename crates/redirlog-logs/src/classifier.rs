use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use tracing::{debug, trace};

use redirlog_types::{LogEntry, LogLevel, RedirectEvent, SeverityHint};

use crate::sanitize::{escape_html, repair_encoding, strip_ansi};

/// Redirect access-log grammar.
///
/// `<client-ip>:<port> - "GET <percent-encoded-path> HTTP/1.1" ... 302 Found ... <duration> ms`
///
/// Anything may precede the client address (the access formatter prepends a
/// timestamp) and sit between the request, the status and the duration.
static REDIRECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        (?P<ip>\d{1,3}(?:\.\d{1,3}){3}) : (?P<port>\d+)
        \s+ - \s+
        "GET \s+ (?P<path>\S+) \s+ HTTP/1\.1"
        .*?
        \b302 \s+ Found\b
        .*?
        (?P<duration>\d+(?:\.\d+)?) \s* ms\b
        "#,
    )
    .expect("redirect pattern is valid")
});

/// An HTTP 302 status in an access-log line
static REDIRECT_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b302\s+Found\b|HTTP/\d(?:\.\d)?"\s+(?:-\s+)?302\b"#)
        .expect("status pattern is valid")
});

/// Query parameter naming the redirected file
const RESOURCE_MARKER: &str = "pickcode";

/// Substrings that make an otherwise unparsed line worth keeping
const IMPORTANT_KEYWORDS: &[&str] = &[
    "Starting",
    "Uvicorn running",
    "Started server process",
    "Waiting for application startup",
    "Application startup complete",
    "Cookies length",
    "Error:",
    "Exception",
    "Traceback",
];

/// Keywords that mark a kept line as an error
const EXCEPTION_MARKERS: &[&str] = &["Exception", "Traceback"];

/// Endpoint paths whose own traffic is noise
#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    /// Live-stream websocket path
    pub stream_path: String,

    /// Historical snapshot path
    pub snapshot_path: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            stream_path: "/ws/logs".to_string(),
            snapshot_path: "/api/logs".to_string(),
        }
    }
}

/// Why a line was not stored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressReason {
    /// Matched a noise pattern
    Noise,
    /// Reported HTTP 302 but did not match the full redirect grammar
    UnparsedRedirect,
    /// Carried no important keyword
    Unimportant,
    /// Classification panicked
    Failed,
}

/// Outcome of classifying one raw line
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Suppress(SuppressReason),
    Emit(LogEntry),
}

/// Outcome of redirect extraction
#[derive(Clone, Debug, PartialEq)]
pub enum RedirectMatch {
    /// Not a 302 line
    NoMatch,
    /// A 302 line without the resource marker or the full grammar
    PartialMatch,
    FullMatch(RedirectEvent),
}

/// Compiled line classifier
pub struct LineClassifier {
    noise: RegexSet,
}

impl LineClassifier {
    /// Build a classifier for the given endpoint paths
    pub fn new(config: &ClassifierConfig) -> Result<Self, regex::Error> {
        let stream = regex::escape(&config.stream_path);
        let snapshot = regex::escape(&config.snapshot_path);

        let noise = RegexSet::new([
            r"GET /static/".to_string(),
            r"GET /favicon\.ico\b".to_string(),
            r"GET /health(?:z)?\b".to_string(),
            r#"HTTP/\d(?:\.\d)?"\s+(?:-\s+)?304\b|\b304 Not Modified\b"#.to_string(),
            r#"HTTP/\d(?:\.\d)?"\s+(?:-\s+)?200\b|\b200 OK\b"#.to_string(),
            r"\bconnection (?:open|closed)\b".to_string(),
            format!(r#""WebSocket {stream}\b"#),
            format!(r"GET {stream}\b"),
            format!(r"GET {snapshot}\b"),
            r"GET / HTTP".to_string(),
        ])?;

        Ok(Self { noise })
    }

    /// Classify one raw log line.
    ///
    /// `hint` is the severity the host logger attached to the line. It can
    /// raise the level of a kept keyword line but never decides whether a
    /// line is kept.
    pub fn classify(&self, raw: &str, hint: SeverityHint) -> Decision {
        let repaired = repair_encoding(raw);
        let line = strip_ansi(&repaired);

        if self.is_noise(&line) {
            trace!(line = %line, "noise line suppressed");
            return Decision::Suppress(SuppressReason::Noise);
        }

        match Self::extract_redirect(&line) {
            RedirectMatch::FullMatch(event) => {
                return Decision::Emit(LogEntry::new(
                    escape_html(&event.message()),
                    LogLevel::Success,
                ));
            }
            RedirectMatch::PartialMatch => {
                // Kept silent on purpose; only visible with debug logging
                debug!(line = %line, "302 line without full redirect grammar dropped");
                return Decision::Suppress(SuppressReason::UnparsedRedirect);
            }
            RedirectMatch::NoMatch => {}
        }

        if IMPORTANT_KEYWORDS.iter().any(|k| line.contains(k)) {
            let level = if hint.is_error() || EXCEPTION_MARKERS.iter().any(|m| line.contains(m)) {
                LogLevel::Error
            } else if hint == SeverityHint::Warning {
                LogLevel::Warning
            } else {
                LogLevel::Info
            };
            trace!(?hint, %level, "important line kept");
            return Decision::Emit(LogEntry::new(escape_html(line.trim()), level));
        }

        Decision::Suppress(SuppressReason::Unimportant)
    }

    /// Check a cleaned line against the noise patterns
    pub fn is_noise(&self, line: &str) -> bool {
        self.noise.is_match(line)
    }

    /// Run redirect extraction on a cleaned line
    pub fn extract_redirect(line: &str) -> RedirectMatch {
        if !REDIRECT_STATUS.is_match(line) {
            return RedirectMatch::NoMatch;
        }
        if !line.to_lowercase().contains(RESOURCE_MARKER) {
            return RedirectMatch::PartialMatch;
        }

        let Some(caps) = REDIRECT_LINE.captures(line) else {
            return RedirectMatch::PartialMatch;
        };
        let Ok(duration_ms) = caps["duration"].parse::<f64>() else {
            return RedirectMatch::PartialMatch;
        };

        let raw_path = &caps["path"];
        let target_path = urlencoding::decode(raw_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());

        RedirectMatch::FullMatch(RedirectEvent {
            client_address: caps["ip"].to_string(),
            target_path,
            duration_ms,
        })
    }
}

impl std::fmt::Debug for LineClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineClassifier")
            .field("noise_patterns", &self.noise.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIRECT: &str = r#"203.0.113.5:54321 - "GET /files/report%20final.pdf?pickcode=abc HTTP/1.1" - 302 Found - 12.3 ms"#;

    fn classifier() -> LineClassifier {
        LineClassifier::new(&ClassifierConfig::default()).unwrap()
    }

    fn emitted(decision: Decision) -> LogEntry {
        match decision {
            Decision::Emit(entry) => entry,
            other => panic!("expected Emit, got {:?}", other),
        }
    }

    #[test]
    fn test_redirect_line_emits_success() {
        let entry = emitted(classifier().classify(REDIRECT, SeverityHint::Info));
        assert_eq!(
            entry.message,
            "302 redirect [203.0.113.5]: /files/report final.pdf?pickcode=abc (12.3 ms)"
        );
        assert_eq!(entry.level, LogLevel::Success);
    }

    #[test]
    fn test_redirect_line_with_timestamp_prefix_and_colors() {
        let line = format!("2024-01-15 10:30:00 - \x1b[36m{}\x1b[0m", REDIRECT);
        let entry = emitted(classifier().classify(&line, SeverityHint::Info));
        assert!(entry.message.starts_with("302 redirect [203.0.113.5]"));
    }

    #[test]
    fn test_redirect_extraction_outcomes() {
        match LineClassifier::extract_redirect(REDIRECT) {
            RedirectMatch::FullMatch(event) => {
                assert_eq!(event.client_address, "203.0.113.5");
                assert_eq!(event.target_path, "/files/report final.pdf?pickcode=abc");
                assert_eq!(event.duration_ms, 12.3);
            }
            other => panic!("expected FullMatch, got {:?}", other),
        }

        // 302 without the resource marker
        let no_marker = r#"203.0.113.5:54321 - "GET /files/a.pdf HTTP/1.1" - 302 Found - 1.0 ms"#;
        assert_eq!(
            LineClassifier::extract_redirect(no_marker),
            RedirectMatch::PartialMatch
        );

        // 302 with the marker but no duration
        let no_duration = r#"203.0.113.5:54321 - "GET /a?pickcode=x HTTP/1.1" - 302 Found"#;
        assert_eq!(
            LineClassifier::extract_redirect(no_duration),
            RedirectMatch::PartialMatch
        );

        assert_eq!(
            LineClassifier::extract_redirect("Started server process [42]"),
            RedirectMatch::NoMatch
        );
    }

    #[test]
    fn test_partial_redirect_is_suppressed() {
        let line = r#"203.0.113.5:54321 - "GET /a?pickcode=x HTTP/1.1" - 302 Found"#;
        assert_eq!(
            classifier().classify(line, SeverityHint::Info),
            Decision::Suppress(SuppressReason::UnparsedRedirect)
        );
    }

    #[test]
    fn test_noise_lines_suppressed() {
        let c = classifier();
        let noise = [
            r#"GET /static/app.css HTTP/1.1" 304"#,
            r#"127.0.0.1:5000 - "GET /favicon.ico HTTP/1.1" 404 Not Found"#,
            r#"127.0.0.1:5000 - "GET /health HTTP/1.1" 200 OK"#,
            r#"127.0.0.1:5000 - "GET /files/x HTTP/1.1" 304 Not Modified"#,
            "INFO:     connection open",
            "INFO:     connection closed",
            r#"127.0.0.1:5000 - "WebSocket /ws/logs" [accepted]"#,
            r#"127.0.0.1:5000 - "GET /api/logs HTTP/1.1" 200 OK"#,
            r#"127.0.0.1:5000 - "GET / HTTP/1.1" 200 OK"#,
        ];
        for line in noise {
            assert_eq!(
                c.classify(line, SeverityHint::Info),
                Decision::Suppress(SuppressReason::Noise),
                "line should be noise: {}",
                line
            );
        }
    }

    #[test]
    fn test_custom_stream_path_is_noise() {
        let c = LineClassifier::new(&ClassifierConfig {
            stream_path: "/live".to_string(),
            snapshot_path: "/history".to_string(),
        })
        .unwrap();
        assert!(c.is_noise(r#"1.2.3.4:1 - "GET /history HTTP/1.1" 200"#));
        assert!(c.is_noise(r#"1.2.3.4:1 - "WebSocket /live" [accepted]"#));
        assert!(!c.is_noise(r#"1.2.3.4:1 - "GET /api/logs HTTP/1.1" 404"#));
    }

    #[test]
    fn test_important_lines() {
        let c = classifier();

        let entry = emitted(c.classify(
            "INFO:     Uvicorn running on http://0.0.0.0:8000",
            SeverityHint::Info,
        ));
        assert_eq!(entry.level, LogLevel::Info);

        let entry = emitted(c.classify("Cookies length: 512", SeverityHint::Info));
        assert_eq!(entry.message, "Cookies length: 512");
        assert_eq!(entry.level, LogLevel::Info);

        let entry = emitted(c.classify(
            "ERROR:    Exception in ASGI application",
            SeverityHint::Error,
        ));
        assert_eq!(entry.level, LogLevel::Error);

        let entry = emitted(c.classify("Error: <bad> & worse", SeverityHint::Info));
        assert_eq!(entry.message, "Error: &lt;bad&gt; &amp; worse");
        assert_eq!(entry.level, LogLevel::Info);
    }

    #[test]
    fn test_hint_raises_kept_line_level() {
        let c = classifier();

        let entry = emitted(c.classify("Error: upload failed", SeverityHint::Error));
        assert_eq!(entry.level, LogLevel::Error);

        let entry = emitted(c.classify("Error: upload failed", SeverityHint::Critical));
        assert_eq!(entry.level, LogLevel::Error);

        let entry = emitted(c.classify("Cookies length: 0", SeverityHint::Warning));
        assert_eq!(entry.level, LogLevel::Warning);

        // Exception markers win over a low hint
        let entry = emitted(c.classify("Traceback (most recent call last):", SeverityHint::Debug));
        assert_eq!(entry.level, LogLevel::Error);

        // A hint alone never keeps a line
        assert_eq!(
            c.classify("ERROR: something unlisted", SeverityHint::Error),
            Decision::Suppress(SuppressReason::Unimportant)
        );
    }

    #[test]
    fn test_accented_text_is_not_repaired() {
        let entry = emitted(classifier().classify("Error: Müller upload failed", SeverityHint::Error));
        assert_eq!(entry.message, "Error: Müller upload failed");
    }

    #[test]
    fn test_other_lines_unimportant() {
        assert_eq!(
            classifier().classify("DEBUG: cache hit for abc", SeverityHint::Debug),
            Decision::Suppress(SuppressReason::Unimportant)
        );
    }

    #[test]
    fn test_status_like_numbers_are_not_noise() {
        let c = classifier();
        let entry = emitted(c.classify("Cookies length: 200", SeverityHint::Info));
        assert_eq!(entry.message, "Cookies length: 200");
        let entry = emitted(c.classify("Cookies length: 302", SeverityHint::Info));
        assert_eq!(entry.message, "Cookies length: 302");
    }

    #[test]
    fn test_misdecoded_redirect_path_is_repaired() {
        let utf8_line = r#"203.0.113.5:1 - "GET /报告?pickcode=a HTTP/1.1" - 302 Found - 3 ms"#;
        let garbled: String = utf8_line.bytes().map(char::from).collect();
        let entry = emitted(classifier().classify(&garbled, SeverityHint::Info));
        assert_eq!(entry.message, "302 redirect [203.0.113.5]: /报告?pickcode=a (3 ms)");
    }
}
