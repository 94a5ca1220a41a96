use std::io::{self, BufReader, Read};

use log::debug;

use crate::error::SizeError;

/// Tokens produced by the Gerber lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Text between two `*` terminators, line breaks removed and trimmed.
    /// Example: `"FSLAX24Y24"`, `"ADD10C,0.020"`, `"X100Y200D01"`
    Command(String),
    /// Opening `%` of an extended block.
    AttributeStart,
    /// Closing `%` of an extended block.
    AttributeEnd,
}

/// Lazy, single-pass tokenizer over a byte stream.
///
/// Gerber uses `*` as a statement terminator and `%...%` around extended
/// commands. The only state carried between calls is whether the cursor is
/// inside a `%` block, which decides how the next `%` is reported.
pub struct Tokenizer<R: Read> {
    bytes: io::Bytes<BufReader<R>>,
    in_attribute: bool,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes(),
            in_attribute: false,
        }
    }

    /// Whether the cursor currently sits inside a `%` block.
    pub fn in_attribute(&self) -> bool {
        self.in_attribute
    }

    /// Read the next token. `Ok(None)` marks the end of the stream.
    pub fn next_token(&mut self) -> Result<Option<Token>, SizeError> {
        let mut text: Vec<u8> = Vec::new();

        while let Some(byte) = self.bytes.next() {
            match byte? {
                b'*' => return Ok(Some(Token::Command(finish(&text)))),
                b'%' => {
                    let stray = finish(&text);
                    if !stray.is_empty() {
                        debug!("discarding unterminated text before '%': {stray}");
                    }
                    self.in_attribute = !self.in_attribute;
                    return Ok(Some(if self.in_attribute {
                        Token::AttributeStart
                    } else {
                        Token::AttributeEnd
                    }));
                }
                b'\r' | b'\n' => {}
                other => text.push(other),
            }
        }

        let stray = finish(&text);
        if !stray.is_empty() {
            debug!("discarding unterminated text at end of file: {stray}");
        }
        Ok(None)
    }
}

fn finish(text: &[u8]) -> String {
    String::from_utf8_lossy(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new(input.as_bytes());
        let mut tokens = Vec::new();
        while let Some(token) = tokenizer.next_token().unwrap() {
            tokens.push(token);
        }
        tokens
    }

    fn cmd(s: &str) -> Token {
        Token::Command(s.to_string())
    }

    #[test]
    fn test_simple_commands() {
        let tokens = tokenize("G01*\nD10*\nX100Y200D01*\nM02*\n");
        assert_eq!(
            tokens,
            vec![cmd("G01"), cmd("D10"), cmd("X100Y200D01"), cmd("M02")]
        );
    }

    #[test]
    fn test_extended_commands() {
        let tokens = tokenize("%FSLAX24Y24*%\n%MOMM*%\n");
        assert_eq!(
            tokens,
            vec![
                Token::AttributeStart,
                cmd("FSLAX24Y24"),
                Token::AttributeEnd,
                Token::AttributeStart,
                cmd("MOMM"),
                Token::AttributeEnd,
            ]
        );
    }

    #[test]
    fn test_multiple_commands_in_one_block() {
        let tokens = tokenize("%AMBOX*\n21,1,2,1,0,0,0*\n%");
        assert_eq!(
            tokens,
            vec![
                Token::AttributeStart,
                cmd("AMBOX"),
                cmd("21,1,2,1,0,0,0"),
                Token::AttributeEnd,
            ]
        );
    }

    #[test]
    fn test_line_breaks_inside_command() {
        let tokens = tokenize("X100\r\nY200\nD01*");
        assert_eq!(tokens, vec![cmd("X100Y200D01")]);
    }

    #[test]
    fn test_comment_kept_as_command() {
        let tokens = tokenize("G04 This is a comment *\n");
        assert_eq!(tokens, vec![cmd("G04 This is a comment")]);
    }

    #[test]
    fn test_attribute_flag_tracks_blocks() {
        let mut tokenizer = Tokenizer::new("%MOMM*%".as_bytes());
        assert!(!tokenizer.in_attribute());
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::AttributeStart));
        assert!(tokenizer.in_attribute());
        assert_eq!(tokenizer.next_token().unwrap(), Some(cmd("MOMM")));
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::AttributeEnd));
        assert!(!tokenizer.in_attribute());
        assert_eq!(tokenizer.next_token().unwrap(), None);
    }

    #[test]
    fn test_unterminated_tail_is_dropped() {
        assert_eq!(tokenize("D10*\nX100"), vec![cmd("D10")]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(tokenize(""), Vec::<Token>::new());
        assert_eq!(tokenize("  \n\r\t  "), Vec::<Token>::new());
    }
}
