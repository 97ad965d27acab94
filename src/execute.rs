use log::{debug, info};
use nix::sys::signal::{raise, signal, SigHandler, Signal};
use nix::sys::wait::{waitid, waitpid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, fork, getpid, setpgid, ForkResult, Pid};

use crate::builtin;
use crate::event::ShError;
use crate::interp::parse::Statement;
use crate::jobs::{Job, JobBuilder};
use crate::shellenv::{attach_tty, ShellEnv};
use crate::signal::{disable_reaping, enable_reaping};
use crate::utils::RustFd;
use crate::ShResult;

const DEV_NULL: &str = "/dev/null";

/// Evaluate one parsed statement: builtins dispatch in-process, everything
/// else is promoted to a job and launched. Foreground-only mode overrides a
/// requested `&`.
pub fn eval(env: &mut ShellEnv, statement: Statement) -> ShResult<()> {
	debug!("evaluating statement {:?}", statement);
	if statement.is_builtin() {
		return builtin::dispatch(env, &statement);
	}

	let foreground = !statement.is_background() || env.is_fg_only();
	let job = JobBuilder::new()
		.with_command(statement.text())
		.with_argv(statement.argv.clone())
		.with_stdin(statement.redir_in().map(String::from))
		.with_stdout(statement.redir_out().map(String::from))
		.background(!foreground)
		.build();
	launch_job(env, job, foreground)
}

/// Fork and exec a job. The parent mirrors the child's process group setup
/// so neither side of the race can observe the other half-done, then either
/// waits (foreground) or registers the job and returns (background).
pub fn launch_job(env: &mut ShellEnv, mut job: Job, foreground: bool) -> ShResult<()> {
	info!("launching {:?} ({})", job.command(), if foreground { "fg" } else { "bg" });
	if foreground {
		// Park the async reaper before forking; otherwise a fast-exiting
		// child can be reaped out from under wait_for_job
		disable_reaping()?;
	}
	match unsafe { fork() } {
		Ok(ForkResult::Child) => exec_child(&job, foreground, env.is_interactive()),
		Ok(ForkResult::Parent { child }) => {
			job.set_pid(child);
			let pgid = if job.pgid().as_raw() == 0 { child } else { job.pgid() };
			job.set_pgid(pgid);
			// Loser of the setpgid race gets EACCES/ESRCH; both are fine
			let _ = setpgid(child, pgid);

			if foreground {
				handle_fg(env, job)
			} else {
				println!("background pid is {}", child);
				env.jobs_mut().insert_job(job);
				Ok(())
			}
		}
		Err(e) => {
			if foreground {
				let _ = enable_reaping();
			}
			Err(ShError::ExecFailed(format!("fork failed: {}", e)))
		}
	}
}

/// Run a job in the foreground: hand it the terminal, wait it out with the
/// async reaper parked (the wait loop is the only reaper), then restore the
/// world.
fn handle_fg(env: &mut ShellEnv, mut job: Job) -> ShResult<()> {
	if env.is_interactive() {
		attach_tty(job.pgid())?;
	}
	let waited = wait_for_job(&mut job);
	enable_reaping()?;
	if env.is_interactive() {
		attach_tty(env.shell_pgid())?;
	}

	let status = waited?;
	if let WaitStatus::Signaled(_, sig, _) = status {
		println!("terminated by signal {}", sig as i32);
	}
	env.set_last_status(status);
	Ok(())
}

/// Block until the job's leader changes state. A SIGTSTP stop is absorbed:
/// the child is restarted with SIGCONT and the stop is re-raised against the
/// shell itself once the job finishes, so the shell's own toggle handler
/// fires (the exec'd child reset it to the default disposition).
pub fn wait_for_job(job: &mut Job) -> ShResult<WaitStatus> {
	let mut absorbed_tstp = false;
	let flags = WaitPidFlag::WEXITED | WaitPidFlag::WSTOPPED | WaitPidFlag::WNOWAIT;

	let status = loop {
		let peeked = waitid(Id::Pid(job.pid()), flags)
			.map_err(|e| ShError::JobControl(format!("waitid failed for pid {}: {}", job.pid(), e)))?;
		match peeked {
			WaitStatus::Stopped(pid, Signal::SIGTSTP) => {
				reap(pid)?;
				job.killpg(Signal::SIGCONT)?;
				absorbed_tstp = true;
			}
			WaitStatus::Stopped(pid, _)
			| WaitStatus::Exited(pid, _)
			| WaitStatus::Signaled(pid, _, _) => {
				let status = reap(pid)?;
				job.proc_mut().set_status(status);
				break status;
			}
			_ => continue,
		}
	};

	if absorbed_tstp {
		raise(Signal::SIGTSTP)
			.map_err(|e| ShError::JobControl(format!("failed to re-raise SIGTSTP: {}", e)))?;
	}
	Ok(status)
}

/// Consume the state change left pending by a WNOWAIT peek
fn reap(pid: Pid) -> ShResult<WaitStatus> {
	waitpid(pid, Some(WaitPidFlag::WUNTRACED))
		.map_err(|e| ShError::JobControl(format!("waitpid failed for pid {}: {}", pid, e)))
}

/// Child-side setup between fork and exec. Never returns; every failure
/// path reports on stderr and exits the child nonzero.
fn exec_child(job: &Job, foreground: bool, interactive: bool) -> ! {
	let pid = getpid();
	let pgid = if job.pgid().as_raw() == 0 { pid } else { job.pgid() };
	let _ = setpgid(Pid::from_raw(0), pgid);
	if interactive && foreground {
		let _ = attach_tty(pgid);
	}

	unsafe {
		if foreground {
			let _ = signal(Signal::SIGINT, SigHandler::SigDfl);
			let _ = signal(Signal::SIGTSTP, SigHandler::SigDfl);
		} else {
			let _ = signal(Signal::SIGINT, SigHandler::SigIgn);
			let _ = signal(Signal::SIGTSTP, SigHandler::SigIgn);
		}
		// Background jobs still stop if they touch the terminal
		let _ = signal(Signal::SIGTTIN, SigHandler::SigDfl);
		let _ = signal(Signal::SIGTTOU, SigHandler::SigDfl);
		let _ = signal(Signal::SIGQUIT, SigHandler::SigDfl);
		let _ = signal(Signal::SIGCHLD, SigHandler::SigDfl);
	}

	// Background jobs with no explicit redirection read from and write to
	// the null device
	let stdin_target = job
		.stdin_file()
		.map(String::from)
		.or_else(|| (!foreground).then(|| DEV_NULL.into()));
	if let Some(path) = stdin_target {
		match RustFd::open_read(&path) {
			Ok(mut fd) => {
				let _ = fd.dup2(&libc::STDIN_FILENO);
				let _ = fd.close();
			}
			Err(e) => {
				eprintln!("{}: {}", path, e);
				std::process::exit(1);
			}
		}
	}

	let stdout_target = job
		.stdout_file()
		.map(String::from)
		.or_else(|| (!foreground).then(|| DEV_NULL.into()));
	if let Some(path) = stdout_target {
		match RustFd::open_write(&path) {
			Ok(mut fd) => {
				let _ = fd.dup2(&libc::STDOUT_FILENO);
				let _ = fd.close();
			}
			Err(e) => {
				eprintln!("{}: {}", path, e);
				std::process::exit(1);
			}
		}
	}

	let argv = job.proc().argv_cstrings();
	let Err(e) = execvp(&argv[0], &argv);
	eprintln!("-smallsh: {}: {}", job.proc().argv()[0], e.desc());
	std::process::exit(1)
}
