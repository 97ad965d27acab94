use nix::unistd::Pid;

use smallsh::interp::expand;
use smallsh::interp::parse::{self, Statement, StmtFlags};

fn parse_one(input: &str) -> Statement {
	let mut statements = parse::parse(input).unwrap();
	assert!(!statements.is_empty(), "expected a statement from {:?}", input);
	statements.pop_front().unwrap()
}

#[test]
fn test_parse_bare_command() {
	let statement = parse_one("cmd\n");
	assert_eq!(statement.argv, vec!["cmd"]);
	assert_eq!(statement.flags, StmtFlags::empty());
}

#[test]
fn test_parse_builtin_flag() {
	let statement = parse_one("cd\n");
	assert_eq!(statement.argv, vec!["cd"]);
	assert_eq!(statement.flags, StmtFlags::BUILTIN);
}

#[test]
fn test_parse_command_with_arguments() {
	let statement = parse_one("echo hello world\n");
	assert_eq!(statement.argv, vec!["echo", "hello", "world"]);
	assert_eq!(statement.flags, StmtFlags::empty());
}

#[test]
fn test_parse_output_redirection() {
	let statement = parse_one("echo > file1.txt\n");
	assert_eq!(statement.argv, vec!["echo"]);
	assert_eq!(statement.outfiles, vec!["file1.txt"]);
	assert_eq!(statement.flags, StmtFlags::empty());
}

#[test]
fn test_parse_everything_at_once() {
	let statement = parse_one("cd ~/Documents . > f1.txt < f2.txt & #\n");
	assert_eq!(statement.argv, vec!["cd", "~/Documents", "."]);
	assert_eq!(statement.outfiles, vec!["f1.txt"]);
	assert_eq!(statement.infiles, vec!["f2.txt"]);
	assert_eq!(statement.flags, StmtFlags::BACKGROUND | StmtFlags::BUILTIN);
}

#[test]
fn test_word_round_trip() {
	// Any line of word-legal characters comes back as the sole argument
	for line in ["cmd", "a-b_c.d", "path/to/thing", "x=1,y=2"] {
		let statement = parse_one(&format!("{}\n", line));
		assert_eq!(statement.argv, vec![line.to_string()]);
	}
}

#[test]
fn test_background_contributes_no_argument() {
	let statement = parse_one("sleep 30 &\n");
	assert!(statement.is_background());
	assert_eq!(statement.argv, vec!["sleep", "30"]);
}

#[test]
fn test_comment_line_parses_to_nothing() {
	assert!(parse::parse("# comment with trailing junk < > & words\n")
		.unwrap()
		.is_empty());
	assert!(parse::parse("#bare\n").unwrap().is_empty());
}

#[test]
fn test_empty_and_blank_lines_parse_to_nothing() {
	assert!(parse::parse("\n").unwrap().is_empty());
	assert!(parse::parse("  \t \n").unwrap().is_empty());
	assert!(parse::parse("").unwrap().is_empty());
}

#[test]
fn test_last_redirection_wins() {
	let statement = parse_one("sort < first.txt < second.txt\n");
	assert_eq!(statement.infiles, vec!["first.txt", "second.txt"]);
	assert_eq!(statement.redir_in(), Some("second.txt"));
}

#[test]
fn test_syntax_errors_produce_no_statements() {
	assert!(parse::parse("< orphan.txt\n").is_err());
	assert!(parse::parse("&\n").is_err());
	assert!(parse::parse("cmd >\n").is_err());
	assert!(parse::parse("cmd > & f\n").is_err());
}

#[test]
fn test_expand_idempotent_without_dollar() {
	for word in ["", "plain", "half$way..no", "a$b$c"] {
		assert_eq!(expand::expand_word(word, Pid::from_raw(9)), word);
	}
}

#[test]
fn test_expand_dollar_run_counts() {
	let pid = Pid::from_raw(31415);
	for k in 0..6usize {
		let even = "$".repeat(2 * k);
		assert_eq!(expand::expand_word(&even, pid), "31415".repeat(k));
		let odd = "$".repeat(2 * k + 1);
		assert_eq!(expand::expand_word(&odd, pid), format!("{}$", "31415".repeat(k)));
	}
}

#[test]
fn test_expansion_reaches_argv_and_redirections() {
	let pid = Pid::from_raw(205);
	let statements = parse::parse_with_pid("mkdir dir$$ > out$$.log < in$$.txt\n", pid).unwrap();
	let statement = &statements[0];
	assert_eq!(statement.argv, vec!["mkdir", "dir205"]);
	assert_eq!(statement.redir_out(), Some("out205.log"));
	assert_eq!(statement.redir_in(), Some("in205.txt"));
}
