use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::event::ShError;
use crate::ShResult;

const PROMPT: &str = ": ";

/// Line source for the main loop
pub struct Prompt {
	rl: DefaultEditor,
}

impl Prompt {
	pub fn new() -> ShResult<Self> {
		let rl = DefaultEditor::new().map_err(|e| ShError::IoError(e.to_string()))?;
		Ok(Self { rl })
	}

	/// One line of input, without its trailing newline. `None` means
	/// end-of-input; an interrupt reads as an empty line.
	pub fn read_line(&mut self) -> ShResult<Option<String>> {
		match self.rl.readline(PROMPT) {
			Ok(line) => {
				if !line.trim().is_empty() {
					let _ = self.rl.add_history_entry(line.as_str());
				}
				Ok(Some(line))
			}
			Err(ReadlineError::Eof) => Ok(None),
			Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
			Err(e) => Err(ShError::IoError(e.to_string())),
		}
	}
}
