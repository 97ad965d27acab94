use log::{debug, error};
use thiserror::Error;

use crate::execute;
use crate::interp::parse;
use crate::prompt::Prompt;
use crate::shellenv::ShellEnv;
use crate::ShResult;

#[derive(Debug, Error, PartialEq)]
pub enum ShError {
	#[error("smallsh: syntax error: {0}")]
	InvalidSyntax(String),

	#[error("smallsh: {0}")]
	ExecFailed(String),

	#[error("smallsh: job control failure: {0}")]
	JobControl(String),

	#[error("smallsh: i/o error: {0}")]
	IoError(String),

	#[error("smallsh: internal error: {0}")]
	Internal(String),

	// Not an actual error; carries the exit code out of the `exit` builtin
	#[error("")]
	CleanExit(i32),
}

impl ShError {
	pub fn from_io(err: &std::io::Error) -> Self {
		ShError::IoError(err.to_string())
	}

	pub fn is_fatal(&self) -> bool {
		match self {
			ShError::JobControl(..) => true,
			ShError::IoError(..) => true,
			ShError::InvalidSyntax(..) => false,
			ShError::ExecFailed(..) => false,
			ShError::Internal(..) => false,
			ShError::CleanExit(..) => false,
		}
	}
}

pub struct EventLoop {
	env: ShellEnv,
	prompt: Prompt,
}

impl EventLoop {
	pub fn new() -> ShResult<Self> {
		let env = ShellEnv::new(unsafe { libc::isatty(libc::STDIN_FILENO) == 1 })?;
		let prompt = Prompt::new()?;
		Ok(Self { env, prompt })
	}

	/// Read-eval loop. One iteration: drain the signal bridge, report and
	/// remove finished background jobs, then read and evaluate one line.
	pub fn listen(&mut self) -> ShResult<i32> {
		debug!("Event loop started.");
		loop {
			self.env.drain_signals()?;
			self.env.jobs_mut().clean();

			let line = match self.prompt.read_line()? {
				Some(line) => line,
				None => break, // EOF
			};

			let statements = match parse::parse(&line) {
				Ok(statements) => statements,
				Err(e) => {
					eprintln!("{}", e);
					continue;
				}
			};

			// Lines may parse into several statements, but only the first
			// one is evaluated
			let statement = match statements.into_iter().next() {
				Some(statement) => statement,
				None => continue,
			};

			match execute::eval(&mut self.env, statement) {
				Ok(()) => {}
				Err(ShError::CleanExit(code)) => return Ok(code),
				Err(e) if e.is_fatal() => {
					error!("Fatal: {:?}", e);
					return Err(e);
				}
				Err(e) => eprintln!("{}", e),
			}
		}
		self.env.jobs_mut().killall();
		Ok(0)
	}
}
