//! Character filtering for real-world XML feeds.
//!
//! Many feeds in the wild embed raw control characters (form feeds pasted
//! from word processors, `0x02` from broken CMS exports) that make an XML 1.0
//! parser reject the whole document. [`XmlCharFilter`] wraps any
//! [`CharStream`] and elides those code points so the rest of the document
//! still parses.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;

/// A character source with one character of lookahead.
pub trait CharStream {
    /// Returns the next character without consuming it.
    fn peek(&mut self) -> Option<char>;
    /// Consumes and returns the next character.
    fn read(&mut self) -> Option<char>;
}

/// [`CharStream`] over a borrowed string.
#[derive(Debug, Clone)]
pub struct StrStream<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> StrStream<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }
}

impl CharStream for StrStream<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn read(&mut self) -> Option<char> {
        self.chars.next()
    }
}

/// Decorator that never yields a code point outside the XML 1.0 character set.
///
/// Illegal characters are dropped as soon as they reach the front of the
/// source, so `peek` and `read` always agree and legal characters keep their
/// original relative order.
#[derive(Debug, Clone)]
pub struct XmlCharFilter<S> {
    source: S,
}

impl<S: CharStream> XmlCharFilter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: CharStream> CharStream for XmlCharFilter<S> {
    fn peek(&mut self) -> Option<char> {
        while let Some(c) = self.source.peek() {
            if is_legal_xml_char(c) {
                return Some(c);
            }
            self.source.read();
        }
        None
    }

    fn read(&mut self) -> Option<char> {
        loop {
            let c = self.source.read()?;
            if is_legal_xml_char(c) {
                return Some(c);
            }
        }
    }
}

impl<S: CharStream> Iterator for XmlCharFilter<S> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        self.read()
    }
}

/// Returns `true` if `code_point` may appear in an XML 1.0 document.
///
/// Besides the ranges the XML grammar forbids outright, this also rejects the
/// discouraged C1 controls (`0x7F..=0x84`, `0x86..=0x9F`); `0x85` (NEL) is kept.
pub fn is_legal_code_point(code_point: u32) -> bool {
    !matches!(
        code_point,
        0x00..=0x08
            | 0x0B
            | 0x0C
            | 0x0E..=0x1F
            | 0x7F..=0x84
            | 0x86..=0x9F
            | 0xD800..=0xDFFF
            | 0xFFFE
            | 0xFFFF
    )
}

pub fn is_legal_xml_char(c: char) -> bool {
    is_legal_code_point(u32::from(c))
}

/// Filters `text` through [`XmlCharFilter`].
///
/// Borrows when nothing needs removing, which is the common case.
pub fn sanitize_xml(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_legal_xml_char) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(XmlCharFilter::new(StrStream::new(text)).collect())
}
