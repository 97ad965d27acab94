use std::collections::VecDeque;

use bitflags::bitflags;
use log::{debug, trace};
use nix::unistd::Pid;

use crate::builtin::BUILTINS;
use crate::event::ShError;
use crate::interp::expand;
use crate::interp::token::{tokenize, Span, TkStream, TkType};
use crate::ShResult;

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct StmtFlags: u32 {
		const BACKGROUND = 0b0001;
		const BUILTIN    = 0b0010;
	}
}

/// The parsed representation of one command: arguments, redirection targets,
/// and background/builtin flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
	pub argv: Vec<String>,
	pub infiles: Vec<String>,
	pub outfiles: Vec<String>,
	pub flags: StmtFlags,
	pub span: Span,
}

impl Statement {
	fn new(span: Span) -> Self {
		Self {
			argv: Vec::new(),
			infiles: Vec::new(),
			outfiles: Vec::new(),
			flags: StmtFlags::empty(),
			span,
		}
	}

	pub fn command(&self) -> &str {
		&self.argv[0]
	}

	/// The effective stdin target; the last redirection wins
	pub fn redir_in(&self) -> Option<&str> {
		self.infiles.last().map(String::as_str)
	}

	/// The effective stdout target; the last redirection wins
	pub fn redir_out(&self) -> Option<&str> {
		self.outfiles.last().map(String::as_str)
	}

	pub fn is_background(&self) -> bool {
		self.flags.contains(StmtFlags::BACKGROUND)
	}

	pub fn is_builtin(&self) -> bool {
		self.flags.contains(StmtFlags::BUILTIN)
	}

	pub fn text(&self) -> String {
		self.argv.join(" ")
	}
}

/// Parse one input line into statements, expanding words along the way.
/// An empty or comment-only line parses to zero statements. Only the first
/// statement of a line is ever evaluated; the rest are parsed and dropped.
pub fn parse(input: &str) -> ShResult<VecDeque<Statement>> {
	parse_with_pid(input, Pid::this())
}

pub fn parse_with_pid(input: &str, pid: Pid) -> ShResult<VecDeque<Statement>> {
	let tokens = tokenize(input)?;
	let mut stream = TkStream::new(tokens);
	let mut statements: VecDeque<Statement> = VecDeque::new();
	let mut cur: Option<Statement> = None;

	while stream.has_next() {
		let token = stream.next_tk().unwrap();
		trace!("parsing token {:?}", token);
		match token.class() {
			TkType::Word => {
				// A word opens a new statement and claims the maximal run
				// of words that follows it
				let mut statement = Statement::new(token.span);
				statement.argv.push(expand::expand_word(token.text(), pid));
				while stream.peek(0).class() == TkType::Word {
					let word = stream.next_tk().unwrap();
					statement.argv.push(expand::expand_word(word.text(), pid));
					statement.span.end = word.span.end;
				}
				if BUILTINS.contains(&statement.command()) {
					statement.flags |= StmtFlags::BUILTIN;
				}
				if let Some(done) = cur.replace(statement) {
					statements.push_back(done);
				}
			}
			TkType::Background => match cur.as_mut() {
				Some(statement) => statement.flags |= StmtFlags::BACKGROUND,
				None => {
					return Err(ShError::InvalidSyntax(
						"`&' requires a preceding command".into(),
					))
				}
			},
			TkType::RedirInput | TkType::RedirOutput => {
				let statement = cur.as_mut().ok_or_else(|| {
					ShError::InvalidSyntax(format!(
						"redirection `{}' requires a preceding command",
						token.text()
					))
				})?;
				let target = stream.peek(0);
				if target.class() != TkType::Word {
					return Err(ShError::InvalidSyntax(format!(
						"expected a filename after `{}'",
						token.text()
					)));
				}
				stream.next_tk();
				let expanded = expand::expand_word(target.text(), pid);
				match token.class() {
					TkType::RedirInput => statement.infiles.push(expanded),
					TkType::RedirOutput => statement.outfiles.push(expanded),
					_ => unreachable!(),
				}
			}
			// Everything after a comment is ignored
			TkType::Comment => break,
			TkType::Newline => break,
		}
	}

	if let Some(statement) = cur {
		statements.push_back(statement);
	}
	debug!("parsed {} statement(s) from {:?}", statements.len(), input);
	Ok(statements)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse_one(input: &str) -> Statement {
		let mut statements = parse(input).unwrap();
		assert!(!statements.is_empty());
		statements.pop_front().unwrap()
	}

	#[test]
	fn bare_command() {
		let statement = parse_one("cmd\n");
		assert_eq!(statement.argv, vec!["cmd"]);
		assert_eq!(statement.flags, StmtFlags::empty());
	}

	#[test]
	fn builtin_is_flagged() {
		let statement = parse_one("cd\n");
		assert_eq!(statement.argv, vec!["cd"]);
		assert!(statement.is_builtin());
		assert!(parse_one("status\n").is_builtin());
		assert!(parse_one("exit\n").is_builtin());
	}

	#[test]
	fn word_run_becomes_argv() {
		let statement = parse_one("echo hello world\n");
		assert_eq!(statement.argv, vec!["echo", "hello", "world"]);
		assert_eq!(statement.flags, StmtFlags::empty());
	}

	#[test]
	fn background_flag_without_argument() {
		let statement = parse_one("sleep 5 &\n");
		assert!(statement.is_background());
		assert_eq!(statement.argv, vec!["sleep", "5"]);
	}

	#[test]
	fn empty_line_yields_no_statements() {
		assert!(parse("\n").unwrap().is_empty());
		assert!(parse("   \t  \n").unwrap().is_empty());
	}

	#[test]
	fn comment_line_yields_no_statements() {
		assert!(parse("# anything at all < > &\n").unwrap().is_empty());
	}

	#[test]
	fn redirection_without_command_is_an_error() {
		assert!(parse("< infile\n").is_err());
		assert!(parse("> outfile\n").is_err());
	}

	#[test]
	fn background_without_command_is_an_error() {
		assert!(parse("&\n").is_err());
	}

	#[test]
	fn redirection_without_filename_is_an_error() {
		assert!(parse("cmd <\n").is_err());
		assert!(parse("cmd > < f\n").is_err());
	}

	#[test]
	fn last_redirection_wins() {
		let statement = parse_one("cmd < a < b > x > y\n");
		assert_eq!(statement.infiles, vec!["a", "b"]);
		assert_eq!(statement.outfiles, vec!["x", "y"]);
		assert_eq!(statement.redir_in(), Some("b"));
		assert_eq!(statement.redir_out(), Some("y"));
	}

	#[test]
	fn only_first_statement_matters_but_rest_still_parse() {
		let statements = parse("cmd1 & cmd2 arg\n").unwrap();
		assert_eq!(statements.len(), 2);
		assert!(statements[0].is_background());
		assert_eq!(statements[0].argv, vec!["cmd1"]);
		assert_eq!(statements[1].argv, vec!["cmd2", "arg"]);
	}

	#[test]
	fn kitchen_sink_line() {
		let statements = parse("cd ~/Documents . > f1.txt < f2.txt & #\n").unwrap();
		let statement = &statements[0];
		assert_eq!(statement.argv, vec!["cd", "~/Documents", "."]);
		assert_eq!(statement.redir_out(), Some("f1.txt"));
		assert_eq!(statement.redir_in(), Some("f2.txt"));
		assert!(statement.is_background());
		assert!(statement.is_builtin());
	}

	#[test]
	fn pid_expansion_in_arguments_and_targets() {
		let pid = Pid::from_raw(777);
		let statements = parse_with_pid("echo $$ > log$$.txt\n", pid).unwrap();
		let statement = &statements[0];
		assert_eq!(statement.argv, vec!["echo", "777"]);
		assert_eq!(statement.redir_out(), Some("log777.txt"));
	}
}
