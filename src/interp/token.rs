use log::trace;

use crate::event::ShError;
use crate::ShResult;

/// Hard ceiling on the number of tokens produced from one input line.
/// Exceeding it is a reported syntax error rather than silent truncation.
pub const MAX_TOKENS: usize = 512;

pub const WHITESPACE: [char; 2] = [' ', '\t'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
	pub start: usize,
	pub end: usize,
}

impl Span {
	pub fn new() -> Self {
		Self { start: 0, end: 0 }
	}
	pub fn from(start: usize, end: usize) -> Self {
		Self { start, end }
	}
}

impl Default for Span {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TkType {
	Comment,
	Word,
	RedirInput,  // `<`
	RedirOutput, // `>`
	Background,  // `&`
	Newline,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tk {
	pub tk_type: TkType,
	pub text: String,
	pub span: Span,
}

impl Tk {
	pub fn new(tk_type: TkType, text: impl Into<String>, span: Span) -> Self {
		Self {
			tk_type,
			text: text.into(),
			span,
		}
	}
	/// Stand-in newline returned by lookahead past the end of the stream
	pub fn end_of_line(pos: usize) -> Self {
		Self::new(TkType::Newline, "\n", Span::from(pos, pos))
	}
	pub fn text(&self) -> &str {
		&self.text
	}
	pub fn class(&self) -> TkType {
		self.tk_type
	}
}

/// Character-level cursor over one input line. Has no knowledge of shell
/// semantics; the lexer decides what a run of characters means.
#[derive(Debug, Clone)]
pub struct CharStream {
	chars: Vec<char>,
	cursor: usize,
}

impl CharStream {
	pub fn new(input: &str) -> Self {
		Self {
			chars: input.chars().collect(),
			cursor: 0,
		}
	}

	pub fn pos(&self) -> usize {
		self.cursor
	}

	pub fn has_next(&self) -> bool {
		self.cursor < self.chars.len()
	}

	pub fn next_char(&mut self) -> Option<char> {
		let ch = self.chars.get(self.cursor).copied();
		if ch.is_some() {
			self.cursor += 1;
		}
		ch
	}

	/// Non-destructive lookahead; `None` stands for the end of the line
	pub fn peek(&self, offset: usize) -> Option<char> {
		self.chars.get(self.cursor + offset).copied()
	}

	pub fn consume_char(&mut self) -> Option<String> {
		self.next_char().map(String::from)
	}

	/// Consume a maximal run of non-terminal characters
	pub fn consume_word(&mut self) -> String {
		let start = self.cursor;
		while !is_terminal(self.peek(0)) {
			self.cursor += 1;
		}
		self.slice(start).unwrap_or_default()
	}

	/// Owned substring between an earlier position and the current cursor
	pub fn slice(&self, from: usize) -> Option<String> {
		if from > self.cursor || self.cursor > self.chars.len() {
			return None;
		}
		Some(self.chars[from..self.cursor].iter().collect())
	}
}

/// Word boundaries: whitespace, tab, newline, or the end of the line
fn is_terminal(ch: Option<char>) -> bool {
	match ch {
		None | Some('\n') => true,
		Some(c) => WHITESPACE.contains(&c),
	}
}

/// Lex one input line using the default token ceiling
pub fn tokenize(input: &str) -> ShResult<Vec<Tk>> {
	tokenize_bounded(input, MAX_TOKENS)
}

pub fn tokenize_bounded(input: &str, max_tokens: usize) -> ShResult<Vec<Tk>> {
	let mut stream = CharStream::new(input);
	let mut tokens: Vec<Tk> = Vec::new();

	while stream.has_next() {
		let c1 = stream.peek(0).unwrap();
		let c2 = stream.peek(1);
		match c1 {
			ch if WHITESPACE.contains(&ch) => {
				stream.next_char();
			}
			'\n' => {
				let start = stream.pos();
				stream.next_char();
				push_bounded(
					&mut tokens,
					Tk::new(TkType::Newline, "\n", Span::from(start, start + 1)),
					max_tokens,
				)?;
				// Newline terminates the scan
				break;
			}
			// A `#` opens a comment only at the head of the line; anywhere
			// else it belongs to a word
			'#' if tokens.is_empty() => {
				let start = stream.pos();
				let text = stream.consume_word();
				push_bounded(
					&mut tokens,
					Tk::new(TkType::Comment, text, Span::from(start, stream.pos())),
					max_tokens,
				)?;
			}
			'<' if is_terminal(c2) => {
				let start = stream.pos();
				let text = stream.consume_char().unwrap();
				push_bounded(
					&mut tokens,
					Tk::new(TkType::RedirInput, text, Span::from(start, stream.pos())),
					max_tokens,
				)?;
			}
			'>' if is_terminal(c2) => {
				let start = stream.pos();
				let text = stream.consume_char().unwrap();
				push_bounded(
					&mut tokens,
					Tk::new(TkType::RedirOutput, text, Span::from(start, stream.pos())),
					max_tokens,
				)?;
			}
			'&' if is_terminal(c2) => {
				let start = stream.pos();
				let text = stream.consume_char().unwrap();
				push_bounded(
					&mut tokens,
					Tk::new(TkType::Background, text, Span::from(start, stream.pos())),
					max_tokens,
				)?;
			}
			_ => {
				let start = stream.pos();
				let text = stream.consume_word();
				push_bounded(
					&mut tokens,
					Tk::new(TkType::Word, text, Span::from(start, stream.pos())),
					max_tokens,
				)?;
			}
		}
	}
	trace!("tokenized {:?} into {} tokens", input, tokens.len());
	Ok(tokens)
}

fn push_bounded(tokens: &mut Vec<Tk>, token: Tk, max_tokens: usize) -> ShResult<()> {
	if tokens.len() >= max_tokens {
		return Err(ShError::InvalidSyntax(format!(
			"too many tokens on one line (max {})",
			max_tokens
		)));
	}
	tokens.push(token);
	Ok(())
}

/// Forward cursor over a token sequence. A `Newline` token is a permanent
/// end-of-stream marker even when more tokens follow it in the backing array.
#[derive(Debug, Clone)]
pub struct TkStream {
	tokens: Vec<Tk>,
	cursor: usize,
}

impl TkStream {
	pub fn new(tokens: Vec<Tk>) -> Self {
		Self { tokens, cursor: 0 }
	}

	fn exhausted_at(&self, pos: usize) -> bool {
		match self.tokens.get(pos) {
			None => true,
			Some(tk) => tk.tk_type == TkType::Newline,
		}
	}

	pub fn has_next(&self) -> bool {
		!self.exhausted_at(self.cursor)
	}

	pub fn next_tk(&mut self) -> Option<Tk> {
		if !self.has_next() {
			return None;
		}
		let tk = self.tokens[self.cursor].clone();
		self.cursor += 1;
		Some(tk)
	}

	/// Lookahead by `offset` steps on a scratch cursor. Exhaustion reads as
	/// a synthetic newline so failed lookahead is always safe to match on.
	pub fn peek(&self, offset: usize) -> Tk {
		let mut scratch = self.cursor;
		for _ in 0..offset {
			if self.exhausted_at(scratch) {
				break;
			}
			scratch += 1;
		}
		if self.exhausted_at(scratch) {
			let pos = self.tokens.last().map(|tk| tk.span.end).unwrap_or(0);
			return Tk::end_of_line(pos);
		}
		self.tokens[scratch].clone()
	}
}
