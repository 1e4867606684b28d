//! Label normalization for slugs
//!
//! Any script is transliterated to ASCII, `&` and `@` are spelled out, and
//! every other run of non-alphanumeric characters becomes a single delimiter.
//! The result is lowercase and never starts or ends with the delimiter.

use deunicode::deunicode_char;

/// Turn a human readable label into a URL-safe slug
///
/// Labels without any transliterable letter or digit give an empty string.
pub fn slugify(text: &str, delimiter: &str) -> String {
    let mut builder = SlugBuilder {
        slug: String::with_capacity(text.len()),
        delimiter,
        pending_delimiter: false,
    };

    for c in text.chars() {
        match c {
            '&' => builder.push_word("and"),
            '@' => builder.push_word("at"),
            _ if c.is_ascii() => builder.push_char(c),
            _ => match deunicode_char(c) {
                Some(ascii) => ascii.chars().for_each(|a| builder.push_char(a)),
                None => builder.pending_delimiter = true,
            },
        }
    }

    builder.slug
}

struct SlugBuilder<'a> {
    slug: String,
    delimiter: &'a str,
    pending_delimiter: bool,
}

impl SlugBuilder<'_> {
    fn push_char(&mut self, c: char) {
        if !c.is_ascii_alphanumeric() {
            self.pending_delimiter = true;
            return;
        }
        if self.pending_delimiter && !self.slug.is_empty() {
            self.slug.push_str(self.delimiter);
        }
        self.pending_delimiter = false;
        self.slug.push(c.to_ascii_lowercase());
    }

    /// Symbols spelled out as a word of their own
    fn push_word(&mut self, word: &str) {
        if !self.slug.is_empty() {
            self.slug.push_str(self.delimiter);
        }
        self.slug.push_str(word);
        self.pending_delimiter = true;
    }
}
