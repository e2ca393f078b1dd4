//! Quote-aware tokenizer for pasted command lines.
//!
//! Every token keeps two views of itself: the `raw` source slice (quotes and escapes exactly
//! as typed) and the unquoted `value` the tool would receive as one argv word. Verb text is
//! rebuilt from raw slices so re-synthesis reproduces the user's quoting.

use crate::error::LexError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// Source text of the token, quotes included.
    pub raw: &'a str,
    /// Argument value after quote removal and escape processing.
    pub value: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// True when any quoting or escaping was involved.
    pub quoted: bool,
}

impl Token<'_> {
    /// Looks like an option (`-n`, `--icsv`) rather than a word.
    pub fn is_flag_like(&self) -> bool {
        self.value.len() > 1 && self.value.starts_with('-')
    }

    /// An unquoted occurrence of `word`.
    pub fn is_bare(&self, word: &str) -> bool {
        !self.quoted && self.raw == word
    }
}

/// Splits `input` on unquoted whitespace.
///
/// Single quotes are literal. Double quotes honour `\"`, `\\`, `` \` `` and `\$`; any other
/// backslash inside them is kept. Outside quotes a backslash escapes the next character and
/// a backslash-newline pair is a line continuation.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut value = String::new();
        let mut quoted = false;
        // Continuation-only runs (`\<newline>`) produce no token.
        let mut meaningful = false;

        while let Some(&(idx, c)) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '\'' => {
                    quoted = true;
                    meaningful = true;
                    loop {
                        match chars.next() {
                            Some((_, '\'')) => break,
                            Some((_, ch)) => value.push(ch),
                            None => {
                                return Err(LexError::UnterminatedQuote {
                                    quote: '\'',
                                    position: idx,
                                });
                            }
                        }
                    }
                }
                '"' => {
                    quoted = true;
                    meaningful = true;
                    loop {
                        match chars.next() {
                            Some((_, '"')) => break,
                            Some((_, '\\')) => match chars.next() {
                                Some((_, ch @ ('"' | '\\' | '`' | '$'))) => value.push(ch),
                                Some((_, '\n')) => {}
                                Some((_, ch)) => {
                                    value.push('\\');
                                    value.push(ch);
                                }
                                None => {
                                    return Err(LexError::UnterminatedQuote {
                                        quote: '"',
                                        position: idx,
                                    });
                                }
                            },
                            Some((_, ch)) => value.push(ch),
                            None => {
                                return Err(LexError::UnterminatedQuote {
                                    quote: '"',
                                    position: idx,
                                });
                            }
                        }
                    }
                }
                '\\' => {
                    quoted = true;
                    match chars.next() {
                        Some((_, '\n')) => {}
                        Some((_, ch)) => {
                            value.push(ch);
                            meaningful = true;
                        }
                        // Trailing lone backslash is kept literally.
                        None => {
                            value.push('\\');
                            meaningful = true;
                        }
                    }
                }
                other => {
                    value.push(other);
                    meaningful = true;
                }
            }
        }

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
        if meaningful {
            tokens.push(Token {
                raw: &input[start..end],
                value,
                start,
                end,
                quoted,
            });
        }
    }

    Ok(tokens)
}
