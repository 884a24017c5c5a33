//! Record-to-text normalization for the counting stage.
//!
//! Every corpus record is a small markup document (a wiki `<page>` on one
//! line). The parser pulls the content of the configured text element out of
//! it and reduces that content to a stream of lowercase words.
//!
//! # Cleaning steps
//!
//! Applied in this order:
//! 1. Decode HTML entities left over after XML unescaping (`&nbsp;`, `&amp;`)
//! 2. Lowercase
//! 3. Blank out URLs (`http`, `https`, `ftp`, `file` schemes)
//! 4. Blank out `<ref>` and `</ref>` delimiters
//! 5. Blank out anything that is not an ASCII letter, apostrophe or space,
//!    and any apostrophe without a letter on both sides
//! 6. Collapse whitespace runs to single spaces and trim
//!
//! ```text
//! "The Cat's ''dog'' visited http://example.com 42 times."
//!     -> "the cat's dog visited times"
//! ```

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::RecordError;

static URL_PATTERN: OnceLock<Regex> = OnceLock::new();
static REF_PATTERN: OnceLock<Regex> = OnceLock::new();

fn url_pattern() -> &'static Regex {
    URL_PATTERN.get_or_init(|| {
        Regex::new(r"(https?|ftp|file)://[-a-zA-Z0-9+&@#/%?=~_|!:,.;]*[-a-zA-Z0-9+&@#/%=~_|]")
            .expect("URL pattern must compile")
    })
}

fn ref_pattern() -> &'static Regex {
    REF_PATTERN.get_or_init(|| Regex::new(r"<ref>|</ref>").expect("ref pattern must compile"))
}

/// Extracts and cleans the text body of one corpus record.
#[derive(Debug, Clone)]
pub struct DocumentParser {
    text_field: String,
}

impl DocumentParser {
    pub fn new(text_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
        }
    }

    /// Parse a record and return its cleaned text.
    ///
    /// # Errors
    /// Returns a [`RecordError`] when the record is not well-formed or has no
    /// text element. Callers skip the record in that case.
    pub fn parse(&self, record: &str) -> Result<String, RecordError> {
        let raw = self.extract_text(record)?;
        Ok(clean_text(&raw))
    }

    /// Concatenated text content of the first text element, nested markup included.
    fn extract_text(&self, record: &str) -> Result<String, RecordError> {
        let mut reader = Reader::from_str(record);
        let field = self.text_field.as_bytes();

        // 0 while outside the text element
        let mut depth = 0usize;
        let mut body = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if depth > 0 {
                        depth += 1;
                    } else if e.name().as_ref() == field {
                        depth = 1;
                    }
                }
                Event::End(_) if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(body);
                    }
                }
                Event::Empty(e) if depth == 0 && e.name().as_ref() == field => {
                    return Ok(String::new());
                }
                Event::Text(t) if depth > 0 => body.push_str(&t.unescape()?),
                Event::CData(c) if depth > 0 => body.push_str(&String::from_utf8_lossy(&c)),
                Event::Eof => break,
                _ => {}
            }
        }

        if depth > 0 {
            Err(RecordError::UnclosedTextField(self.text_field.clone()))
        } else {
            Err(RecordError::MissingTextField(self.text_field.clone()))
        }
    }
}

/// Normalize raw document text into space-separated lowercase words.
pub fn clean_text(raw: &str) -> String {
    let text = html_escape::decode_html_entities(raw).to_lowercase();
    let text = url_pattern().replace_all(&text, " ");
    let text = ref_pattern().replace_all(&text, " ");
    let text = strip_non_letters(&text);

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_non_letters(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_letter = |index: Option<usize>| {
        index
            .and_then(|i| chars.get(i))
            .is_some_and(|c| c.is_ascii_alphabetic())
    };

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| match c {
            c if c.is_ascii_alphabetic() || c == ' ' => c,
            '\'' if is_letter(i.checked_sub(1)) && is_letter(Some(i + 1)) => c,
            _ => ' ',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DocumentParser {
        DocumentParser::new("text")
    }

    #[test]
    fn test_parse_wiki_page() {
        let record = "<page><title>Cats</title><revision><text xml:space=\"preserve\">\
            The Cat's ''dog'' visited http://example.com/x?y=1 \
            &lt;ref&gt;Smith&lt;/ref&gt; 42 times.</text></revision></page>";

        let text = parser().parse(record).unwrap();
        assert_eq!(text, "the cat's dog visited smith times");
    }

    #[test]
    fn test_double_escaped_entities() {
        let record = "<page><text>AT&amp;amp;T rocks&amp;nbsp;hard</text></page>";
        assert_eq!(parser().parse(record).unwrap(), "at t rocks hard");
    }

    #[test]
    fn test_apostrophes() {
        assert_eq!(
            clean_text("'tis rock 'n' roll, don't o'clock''"),
            "tis rock n roll don't o'clock"
        );
        assert_eq!(clean_text("5'6 tall"), "tall");
    }

    #[test]
    fn test_urls_removed() {
        assert_eq!(
            clean_text("see https://www.rust-lang.org/learn now, or ftp://host/file.txt"),
            "see now or"
        );
    }

    #[test]
    fn test_nested_markup_contributes_text() {
        let record = "<page><text>hello <b>big</b> world</text></page>";
        assert_eq!(parser().parse(record).unwrap(), "hello big world");
    }

    #[test]
    fn test_empty_text_element() {
        assert_eq!(parser().parse("<page><text/></page>").unwrap(), "");
        assert_eq!(parser().parse("<page><text>  123 </text></page>").unwrap(), "");
    }

    #[test]
    fn test_custom_text_field() {
        let parser = DocumentParser::new("body");
        let record = "<doc><text>ignored</text><body>Used Here</body></doc>";
        assert_eq!(parser.parse(record).unwrap(), "used here");
    }

    #[test]
    fn test_missing_text_field() {
        let result = parser().parse("<page><title>No body</title></page>");
        assert!(matches!(result, Err(RecordError::MissingTextField(_))));
    }

    #[test]
    fn test_malformed_record() {
        assert!(parser().parse("<page><text>abc</page>").is_err());
        assert!(parser().parse("<page><text>abc").is_err());
    }
}
