// scriplib.rs -- Whitespace separated tokens with line tracking
//
// Comments are `//`, `;`, `#` to end of line and `/* ... */`. Quoted
// tokens may contain whitespace.

use crate::error::{CompileError, Result};

pub const MAX_TOKEN: usize = 1024;

pub struct Script {
    data: Vec<u8>,
    pos: usize,
    line: usize,
    pub token: String,
}

impl Script {
    pub fn new(text: &str) -> Self {
        Self { data: text.as_bytes().to_vec(), pos: 0, line: 1, token: String::new() }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError::Parse { line: self.line, msg: msg.into() }
    }

    fn incomplete(&self) -> CompileError {
        self.error("line is incomplete")
    }

    fn at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    /// Skip whitespace and comments. Fails when a newline is crossed and
    /// `crossline` is false.
    fn skip_space(&mut self, crossline: bool) -> Result<bool> {
        loop {
            while let Some(c) = self.at(0) {
                if c > b' ' {
                    break;
                }
                self.pos += 1;
                if c == b'\n' {
                    if !crossline {
                        return Err(self.incomplete());
                    }
                    self.line += 1;
                }
            }
            let Some(c) = self.at(0) else {
                return Ok(false);
            };

            if c == b';' || c == b'#' || (c == b'/' && self.at(1) == Some(b'/')) {
                if !crossline {
                    return Err(self.incomplete());
                }
                while let Some(c) = self.at(0) {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }

            if c == b'/' && self.at(1) == Some(b'*') {
                if !crossline {
                    return Err(self.incomplete());
                }
                self.pos += 2;
                loop {
                    match (self.at(0), self.at(1)) {
                        (None, _) => return Ok(false),
                        (Some(b'*'), Some(b'/')) => {
                            self.pos += 2;
                            break;
                        }
                        (Some(c), _) => {
                            if c == b'\n' {
                                self.line += 1;
                            }
                            self.pos += 1;
                        }
                    }
                }
                continue;
            }

            return Ok(true);
        }
    }

    /// Read the next token into `self.token`. Returns false at the end of
    /// the script.
    pub fn get_token(&mut self, crossline: bool) -> Result<bool> {
        if !self.skip_space(crossline)? {
            if !crossline {
                return Err(self.incomplete());
            }
            return Ok(false);
        }

        let mut token = Vec::new();
        if self.at(0) == Some(b'"') {
            self.pos += 1;
            while let Some(c) = self.at(0) {
                self.pos += 1;
                if c == b'"' {
                    break;
                }
                if c == b'\n' {
                    self.line += 1;
                }
                token.push(c);
            }
        } else {
            while let Some(c) = self.at(0) {
                if c <= b' ' || c == b';' {
                    break;
                }
                token.push(c);
                self.pos += 1;
            }
        }

        if token.len() >= MAX_TOKEN {
            return Err(self.error("token too large"));
        }
        self.token = String::from_utf8_lossy(&token).into_owned();
        Ok(true)
    }

    /// Next token on the current line, failing if the line ends first.
    pub fn expect_token(&mut self) -> Result<&str> {
        self.get_token(false)?;
        Ok(&self.token)
    }

    /// True if another token follows on the same line.
    pub fn token_available(&self) -> bool {
        let mut p = self.pos;
        while let Some(&c) = self.data.get(p) {
            if c == b'\n' {
                return false;
            }
            if c > b' ' {
                return c != b';';
            }
            p += 1;
        }
        false
    }

    pub fn parse_f32(&mut self) -> Result<f32> {
        self.get_token(false)?;
        self.token.parse().map_err(|_| self.error(format!("expected a number, found '{}'", self.token)))
    }

    pub fn parse_i32(&mut self) -> Result<i32> {
        self.get_token(false)?;
        self.token
            .parse::<i32>()
            .or_else(|_| self.token.parse::<f32>().map(|f| f as i32))
            .map_err(|_| self.error(format!("expected an integer, found '{}'", self.token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_and_lines() {
        let mut s = Script::new("{\n\"classname\" \"worldspawn\"\n// comment\n}\n");
        assert!(s.get_token(true).unwrap());
        assert_eq!(s.token, "{");
        assert!(s.get_token(true).unwrap());
        assert_eq!(s.token, "classname");
        assert_eq!(s.line(), 2);
        assert!(s.get_token(false).unwrap());
        assert_eq!(s.token, "worldspawn");
        assert!(s.get_token(true).unwrap());
        assert_eq!(s.token, "}");
        assert_eq!(s.line(), 4);
        assert!(!s.get_token(true).unwrap());
    }

    #[test]
    fn test_token_available_stops_at_newline() {
        let mut s = Script::new("a b\nc");
        s.get_token(true).unwrap();
        assert!(s.token_available());
        s.get_token(false).unwrap();
        assert!(!s.token_available());
        assert!(s.get_token(false).is_err());
    }

    #[test]
    fn test_block_comment_and_numbers() {
        let mut s = Script::new("/* skip\nme */ 12 -3.5 7.0");
        assert_eq!(s.parse_i32().unwrap_err().to_string(), "line 1: line is incomplete");
        let mut s = Script::new("/* skip\nme */ 12 -3.5 7.0");
        assert!(s.get_token(true).unwrap());
        assert_eq!(s.token, "12");
        assert_eq!(s.line(), 2);
        assert_eq!(s.parse_f32().unwrap(), -3.5);
        assert_eq!(s.parse_i32().unwrap(), 7);
    }
}
