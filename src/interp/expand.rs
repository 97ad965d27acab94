use nix::unistd::Pid;

/// Expand `$$` pairs in a word into the running shell's own pid
pub fn expand(word: &str) -> String {
	expand_word(word, Pid::this())
}

/// Each non-overlapping `$$` pair becomes `pid` in decimal, scanning left to
/// right. A `$` without a `$` directly behind it is copied literally, as is
/// everything else.
pub fn expand_word(word: &str, pid: Pid) -> String {
	let pid_text = pid.as_raw().to_string();
	let mut result = String::with_capacity(word.len());
	let mut chars = word.chars().peekable();

	while let Some(ch) = chars.next() {
		if ch == '$' && chars.peek() == Some(&'$') {
			chars.next();
			result.push_str(&pid_text);
		} else {
			result.push(ch);
		}
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;

	const PID: Pid = Pid::from_raw(4923);

	#[test]
	fn no_dollar_is_identity() {
		for word in ["", "plain", "with spaces? no", "a-b_c.d"] {
			assert_eq!(expand_word(word, PID), word);
		}
	}

	#[test]
	fn lone_dollar_is_literal() {
		assert_eq!(expand_word("$", PID), "$");
		assert_eq!(expand_word("a$b", PID), "a$b");
		assert_eq!(expand_word("trailing$", PID), "trailing$");
	}

	#[test]
	fn pair_substitutes_pid() {
		assert_eq!(expand_word("$$", PID), "4923");
		assert_eq!(expand_word("pre$$post", PID), "pre4923post");
	}

	#[test]
	fn non_adjacent_pairs_each_substitute() {
		assert_eq!(expand_word("$$ and $$", PID), "4923 and 4923");
		assert_eq!(expand_word("a$$b$$c", PID), "a4923b4923c");
	}

	#[test]
	fn even_dollar_runs_substitute_pairwise() {
		for k in [1usize, 2, 3, 8] {
			let input = "$".repeat(2 * k);
			let expected = "4923".repeat(k);
			assert_eq!(expand_word(&input, PID), expected);
		}
	}

	#[test]
	fn odd_dollar_runs_leave_one_literal() {
		for k in [0usize, 1, 2, 7] {
			let input = "$".repeat(2 * k + 1);
			let expected = format!("{}$", "4923".repeat(k));
			assert_eq!(expand_word(&input, PID), expected);
		}
	}
}
