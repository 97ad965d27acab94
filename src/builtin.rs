use std::env;
use std::path::PathBuf;

use log::debug;

use crate::event::ShError;
use crate::interp::parse::Statement;
use crate::shellenv::ShellEnv;
use crate::ShResult;

pub const BUILTINS: [&str; 3] = ["cd", "exit", "status"];

pub fn dispatch(env: &mut ShellEnv, statement: &Statement) -> ShResult<()> {
	match statement.command() {
		"cd" => cd(env, statement),
		"exit" => exit(env),
		"status" => status(env),
		name => Err(ShError::Internal(format!("not a builtin: {}", name))),
	}
}

/// `cd [dir]`: with no argument, go home. Keeps `PWD` exported for child
/// processes.
fn cd(env: &mut ShellEnv, statement: &Statement) -> ShResult<()> {
	let target = statement
		.argv
		.get(1)
		.map(PathBuf::from)
		.unwrap_or_else(|| env.home());
	debug!("cd to {:?}", target);
	if let Err(e) = env::set_current_dir(&target) {
		eprintln!("smallsh: cd: {}: {}", target.display(), e);
		return Ok(());
	}
	if let Ok(cwd) = env::current_dir() {
		env::set_var("PWD", cwd);
	}
	Ok(())
}

/// `exit`: take down every tracked job's process group, then leave. The
/// exit code rides out through the error channel.
fn exit(env: &mut ShellEnv) -> ShResult<()> {
	env.jobs_mut().killall();
	Err(ShError::CleanExit(0))
}

/// `status`: report how the last foreground job ended
fn status(env: &mut ShellEnv) -> ShResult<()> {
	println!("{}", env.last_status_line());
	Ok(())
}
