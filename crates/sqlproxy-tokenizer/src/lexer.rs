//! SQL lexical tokenizer.
//!
//! [`tokenize`] turns a byte span into the full token sequence for that span.
//! It never fails: unterminated strings and comments are closed at end of
//! input with whatever text was accumulated.
//!
//! The automaton state is a [`ScanState`] value owned by one call. Each step
//! consumes input through a bounds-checked [`Cursor`] and returns the next
//! state, so an input that ends inside a quote or comment cannot influence
//! any later call.
//!
//! Token text carries the token's *value*:
//! - quoted tokens drop the surrounding quotes and collapse a doubled
//!   delimiter into one; backslash escapes are kept verbatim,
//! - comments drop their marker, one whitespace separator after it, and
//!   their terminator.

use memchr::{memchr, memchr2, memmem};
use tracing::trace;

use crate::token::{Token, TokenId, TokenText, lookup_keyword};

/// Mode governing how the next bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Initial,
    InSingleQuoted,
    InDoubleQuoted,
    InBacktickQuoted,
    InLineComment,
    InBlockComment,
    /// `/*! ... */` executable comment.
    InMysqlComment,
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Read position over the input. All accessors are bounds-checked.
#[derive(Debug)]
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    const fn pos(&self) -> usize {
        self.pos
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Move back to an earlier position.
    fn rewind(&mut self, pos: usize) {
        debug_assert!(pos <= self.pos);
        self.pos = pos;
    }

    /// Advance by `n` bytes, clamped at end of input.
    fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.input.len());
    }

    fn rest(&self) -> &'a [u8] {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn slice(&self, start: usize) -> &'a [u8] {
        self.input.get(start..self.pos).unwrap_or_default()
    }

    /// Length of the identifier run starting `ahead` bytes from here.
    fn ident_run(&self, ahead: usize) -> usize {
        self.input
            .get(self.pos + ahead..)
            .map_or(0, |rest| rest.iter().take_while(|&&b| is_ident_byte(b)).count())
    }

    fn digit_run(&self, ahead: usize) -> usize {
        self.input.get(self.pos + ahead..).map_or(0, |rest| {
            rest.iter().take_while(|b| b.is_ascii_digit()).count()
        })
    }
}

const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

const fn is_quote(b: u8) -> bool {
    matches!(b, b'\'' | b'"' | b'`')
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

struct Scanner<'a> {
    cursor: Cursor<'a>,
    tokens: Vec<Token>,
    /// Start of the raw extent of the token being scanned.
    start: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(input),
            // Rough guess: SQL averages well over four bytes per token.
            tokens: Vec::with_capacity(input.len() / 4 + 1),
            start: 0,
        }
    }

    fn emit(&mut self, id: TokenId, text: TokenText) {
        let len = self.cursor.pos() - self.start;
        self.tokens.push(Token::new(id, text, self.start, len));
    }

    /// Emit the raw bytes consumed since `start` as the token text.
    fn emit_raw(&mut self, id: TokenId) {
        let text = TokenText::from_slice(self.cursor.slice(self.start));
        self.emit(id, text);
    }

    /// Consume `n` bytes and emit them as one token.
    fn operator(&mut self, id: TokenId, n: usize) -> ScanState {
        self.cursor.advance(n);
        self.emit_raw(id);
        ScanState::Initial
    }

    /// Run one automaton step. Returns `None` once the input is exhausted in
    /// the initial state.
    fn step(&mut self, state: ScanState) -> Option<ScanState> {
        let next = match state {
            ScanState::Initial => return self.scan_initial(),
            ScanState::InSingleQuoted => self.scan_quoted(b'\'', TokenId::String, true),
            ScanState::InDoubleQuoted => self.scan_quoted(b'"', TokenId::String, true),
            ScanState::InBacktickQuoted => self.scan_quoted(b'`', TokenId::Literal, false),
            ScanState::InLineComment => self.scan_line_comment(),
            ScanState::InBlockComment => self.scan_block_comment(TokenId::Comment),
            ScanState::InMysqlComment => self.scan_block_comment(TokenId::CommentMysql),
        };
        Some(next)
    }

    fn scan_initial(&mut self) -> Option<ScanState> {
        while self.cursor.peek().is_some_and(is_whitespace) {
            self.cursor.advance(1);
        }
        self.start = self.cursor.pos();
        let byte = self.cursor.peek()?;
        let second = self.cursor.peek_at(1);

        let next = match byte {
            b'\'' => self.open(1, ScanState::InSingleQuoted),
            b'"' => self.open(1, ScanState::InDoubleQuoted),
            b'`' => self.open(1, ScanState::InBacktickQuoted),
            b'-' if second == Some(b'-')
                && self.cursor.peek_at(2).is_none_or(is_whitespace) =>
            {
                self.open_comment(2, ScanState::InLineComment)
            }
            b'#' => self.open_comment(1, ScanState::InLineComment),
            b'/' if second == Some(b'*') => {
                if self.cursor.peek_at(2) == Some(b'!') {
                    self.open_comment(3, ScanState::InMysqlComment)
                } else {
                    self.open_comment(2, ScanState::InBlockComment)
                }
            }
            b'0'..=b'9' => self.scan_number(),
            b'@' => self.scan_variable(),
            b if is_ident_byte(b) => self.scan_word(),
            b'<' => match second {
                Some(b'=') => self.operator(TokenId::Le, 2),
                Some(b'>') => self.operator(TokenId::Ne, 2),
                _ => self.operator(TokenId::Lt, 1),
            },
            b'>' if second == Some(b'=') => self.operator(TokenId::Ge, 2),
            b'>' => self.operator(TokenId::Gt, 1),
            b'!' if second == Some(b'=') => self.operator(TokenId::Ne, 2),
            b':' if second == Some(b'=') => self.operator(TokenId::Assign, 2),
            b'&' if second == Some(b'&') => self.operator(TokenId::LogicalAnd, 2),
            b'&' => self.operator(TokenId::BitwiseAnd, 1),
            b'|' if second == Some(b'|') => self.operator(TokenId::LogicalOr, 2),
            b'|' => self.operator(TokenId::BitwiseOr, 1),
            b'^' => self.operator(TokenId::BitwiseXor, 1),
            b'=' => self.operator(TokenId::Eq, 1),
            b'+' => self.operator(TokenId::Plus, 1),
            b'-' => self.operator(TokenId::Minus, 1),
            b'*' => self.operator(TokenId::Star, 1),
            b'/' => self.operator(TokenId::Div, 1),
            b'.' => self.operator(TokenId::Dot, 1),
            b',' => self.operator(TokenId::Comma, 1),
            b'(' => self.operator(TokenId::OBrace, 1),
            b')' => self.operator(TokenId::CBrace, 1),
            b';' => self.operator(TokenId::Semicolon, 1),
            _ => self.operator(TokenId::Unknown, 1),
        };
        Some(next)
    }

    fn open(&mut self, marker_len: usize, state: ScanState) -> ScanState {
        self.cursor.advance(marker_len);
        state
    }

    /// Consume a comment marker and at most one separator byte after it. A
    /// newline is never taken as the separator of a line comment.
    fn open_comment(&mut self, marker_len: usize, state: ScanState) -> ScanState {
        self.cursor.advance(marker_len);
        let separator = self.cursor.peek().is_some_and(|b| {
            is_whitespace(b) && !(state == ScanState::InLineComment && b == b'\n')
        });
        if separator {
            self.cursor.advance(1);
        }
        state
    }

    /// A closing delimiter directly followed by another quote character is
    /// taken as literal text, as long as the delimiter shows up again later.
    /// If the input ends first, the token is closed at the earliest such
    /// delimiter instead.
    fn scan_quoted(&mut self, delim: u8, id: TokenId, backslash_escapes: bool) -> ScanState {
        let mut text = TokenText::new();
        // (cursor position after the delimiter, text length before it)
        let mut fallback: Option<(usize, usize)> = None;
        let terminated = loop {
            let rest = self.cursor.rest();
            let hit = if backslash_escapes {
                memchr2(delim, b'\\', rest)
            } else {
                memchr(delim, rest)
            };
            let Some(at) = hit else {
                text.extend_from_slice(rest);
                self.cursor.advance(rest.len());
                break false;
            };
            text.extend_from_slice(&rest[..at]);
            self.cursor.advance(at);

            match self.cursor.bump() {
                Some(b'\\') if backslash_escapes => {
                    text.push(b'\\');
                    match self.cursor.bump() {
                        Some(escaped) => text.push(escaped),
                        None => break false,
                    }
                }
                Some(_) => match self.cursor.peek() {
                    Some(next) if next == delim => {
                        self.cursor.advance(1);
                        text.push(delim);
                    }
                    Some(next) if is_quote(next) => {
                        fallback = fallback.or(Some((self.cursor.pos(), text.len())));
                        text.push(delim);
                    }
                    _ => break true,
                },
                None => break false,
            }
        };

        if !terminated {
            if let Some((pos, len)) = fallback {
                self.cursor.rewind(pos);
                text.truncate(len);
            } else {
                trace!(
                    offset = self.start,
                    delimiter = %char::from(delim),
                    "unterminated quote closed at end of input"
                );
            }
        }
        self.emit(id, text);
        ScanState::Initial
    }

    fn scan_line_comment(&mut self) -> ScanState {
        let rest = self.cursor.rest();
        let end = memchr(b'\n', rest).unwrap_or(rest.len());
        let mut body = &rest[..end];
        if let Some(stripped) = body.strip_suffix(b"\r") {
            body = stripped;
        }
        self.cursor.advance(end);
        self.emit(TokenId::Comment, TokenText::from_slice(body));
        ScanState::Initial
    }

    fn scan_block_comment(&mut self, id: TokenId) -> ScanState {
        let rest = self.cursor.rest();
        let body = if let Some(end) = memmem::find(rest, b"*/") {
            self.cursor.advance(end + 2);
            &rest[..end]
        } else {
            trace!(offset = self.start, "unterminated comment closed at end of input");
            self.cursor.advance(rest.len());
            rest
        };
        self.emit(id, TokenText::from_slice(body));
        ScanState::Initial
    }

    /// Identifier or keyword.
    fn scan_word(&mut self) -> ScanState {
        let run = self.cursor.ident_run(0);
        self.cursor.advance(run);
        let word = self.cursor.slice(self.start);
        let id = lookup_keyword(word).unwrap_or(TokenId::Literal);
        self.emit_raw(id);
        ScanState::Initial
    }

    /// `@user_var` / `@@system_var`.
    fn scan_variable(&mut self) -> ScanState {
        let sigils = if self.cursor.peek_at(1) == Some(b'@') { 2 } else { 1 };
        let run = self.cursor.ident_run(sigils);
        self.cursor.advance(sigils + run);
        self.emit_raw(TokenId::Literal);
        ScanState::Initial
    }

    /// Integer, float, or an identifier that happens to start with a digit.
    fn scan_number(&mut self) -> ScanState {
        let run = self.cursor.ident_run(0);
        let digits = self.cursor.digit_run(0);

        if digits == run {
            self.cursor.advance(digits);
            let fraction = self.cursor.peek() == Some(b'.')
                && self.cursor.peek_at(1).is_some_and(|b| b.is_ascii_digit());
            if fraction {
                let frac_digits = self.cursor.digit_run(1);
                self.cursor.advance(1 + frac_digits);
                self.scan_exponent();
                self.emit_raw(TokenId::Float);
            } else {
                self.emit_raw(TokenId::Integer);
            }
            return ScanState::Initial;
        }

        let exponent_at = digits;
        let is_exponent_marker = matches!(self.cursor.peek_at(exponent_at), Some(b'e' | b'E'));
        if is_exponent_marker && digits > 0 {
            let exp_digits = self.cursor.digit_run(exponent_at + 1);
            // 1e5
            if exp_digits > 0 && exponent_at + 1 + exp_digits == run {
                self.cursor.advance(run);
                self.emit_raw(TokenId::Float);
                return ScanState::Initial;
            }
            // 1e+5 / 1e-5
            let signed = exponent_at + 1 == run
                && matches!(self.cursor.peek_at(run), Some(b'+' | b'-'))
                && self.cursor.peek_at(run + 1).is_some_and(|b| b.is_ascii_digit());
            if signed {
                let exp_digits = self.cursor.digit_run(run + 1);
                self.cursor.advance(run + 1 + exp_digits);
                self.emit_raw(TokenId::Float);
                return ScanState::Initial;
            }
        }

        self.cursor.advance(run);
        self.emit_raw(TokenId::Literal);
        ScanState::Initial
    }

    /// Optional `[eE][+-]?digits` suffix of a decimal number.
    fn scan_exponent(&mut self) {
        if !matches!(self.cursor.peek(), Some(b'e' | b'E')) {
            return;
        }
        let sign = usize::from(matches!(self.cursor.peek_at(1), Some(b'+' | b'-')));
        let exp_digits = self.cursor.digit_run(1 + sign);
        if exp_digits > 0 {
            self.cursor.advance(1 + sign + exp_digits);
        }
    }

    fn finish(self) -> Vec<Token> {
        debug_assert!(self.cursor.is_eof());
        self.tokens
    }
}

/// Tokenize `input` into an ordered token sequence covering all of it.
///
/// Whitespace between tokens is skipped. Each call starts from the initial
/// state; nothing is carried over between calls.
#[must_use]
pub fn tokenize(input: &[u8]) -> Vec<Token> {
    let mut scanner = Scanner::new(input);
    let mut state = ScanState::Initial;
    while let Some(next) = scanner.step(state) {
        state = next;
    }
    scanner.finish()
}

/// Convenience wrapper for string input.
#[must_use]
pub fn tokenize_str(input: &str) -> Vec<Token> {
    tokenize(input.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
