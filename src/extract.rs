//! Readable-text extraction from HTML

use scraper::{Html, Selector};

/// Turns raw HTML into readable text. Returns an empty string when the
/// page has nothing worth reading.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str) -> String;
}

/// html2text rendering with short/blank lines dropped
#[derive(Debug, Clone)]
pub struct Html2TextExtractor {
    width: usize,
}

impl Default for Html2TextExtractor {
    fn default() -> Self {
        Self { width: 120 }
    }
}

impl ContentExtractor for Html2TextExtractor {
    fn extract(&self, html: &str) -> String {
        let text = match html2text::from_read(html.as_bytes(), self.width) {
            Ok(text) => text,
            Err(_) => return fallback_text(html),
        };

        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .filter(|l| l.chars().count() > 2)
            .collect();

        if lines.is_empty() {
            return fallback_text(html);
        }
        lines.join("\n")
    }
}

/// Plain text of `<body>`, whitespace collapsed
fn fallback_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("body") else {
        return String::new();
    };
    doc.select(&selector)
        .next()
        .map(|body| {
            body.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Page `<title>`, if any
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Truncate to at most `max_chars` characters (0 = unlimited)
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic() {
        let html = r#"
            <html>
            <head><title>Test Page</title></head>
            <body>
                <h1>Main Title</h1>
                <p>Some content here.</p>
            </body>
            </html>
        "#;
        let text = Html2TextExtractor::default().extract(html);
        assert!(text.contains("Main Title"));
        assert!(text.contains("Some content here."));
    }

    #[test]
    fn test_extract_nothing_readable() {
        let text = Html2TextExtractor::default().extract("<html><body></body></html>");
        assert!(text.trim().is_empty());
    }

    #[test]
    fn test_page_title() {
        assert_eq!(
            page_title("<title> Hello </title>"),
            Some("Hello".to_string())
        );
        assert_eq!(page_title("<p>none</p>"), None);
    }

    #[test]
    fn test_clamp_text() {
        assert_eq!(clamp_text("short", 10), "short");
        assert_eq!(clamp_text("abcdefgh", 3), "abc");
        assert_eq!(clamp_text("abcdefgh", 0), "abcdefgh");
        // multi-byte characters are never split
        assert_eq!(clamp_text("ééééé", 2), "éé");
    }
}
