use std::env;
use std::os::fd::BorrowedFd;
use std::path::PathBuf;

use libc::STDIN_FILENO;
use log::{debug, trace};
use nix::sys::wait::WaitStatus;
use nix::unistd::{getpgrp, tcsetpgrp, Pid};

use crate::event::ShError;
use crate::jobs::{describe_status, JobTable};
use crate::signal::{self, BridgeEvent, SignalBridge};
use crate::ShResult;

/// Hand the controlling terminal to the given process group
pub fn attach_tty(pgid: Pid) -> ShResult<()> {
	trace!("attaching terminal to pgid {}", pgid);
	let tty = unsafe { BorrowedFd::borrow_raw(STDIN_FILENO) };
	tcsetpgrp(tty, pgid)
		.map_err(|e| ShError::JobControl(format!("failed to hand terminal to pgid {}: {}", pgid, e)))
}

/// Everything the main loop threads through one place: interactivity, the
/// shell's own process group, foreground-only mode, the last foreground
/// status, the job table, and the signal bridge read-ends.
pub struct ShellEnv {
	interactive: bool,
	shell_pgid: Pid,
	fg_only: bool,
	last_status: WaitStatus,
	jobs: JobTable,
	bridge: SignalBridge,
}

impl ShellEnv {
	pub fn new(interactive: bool) -> ShResult<Self> {
		let bridge = SignalBridge::new()?;
		signal::sig_handler_setup()?;
		Ok(Self {
			interactive,
			shell_pgid: getpgrp(),
			fg_only: false,
			last_status: WaitStatus::Exited(Pid::from_raw(0), 0),
			jobs: JobTable::new(),
			bridge,
		})
	}

	pub fn is_interactive(&self) -> bool {
		self.interactive
	}

	pub fn shell_pgid(&self) -> Pid {
		self.shell_pgid
	}

	pub fn is_fg_only(&self) -> bool {
		self.fg_only
	}

	pub fn set_last_status(&mut self, status: WaitStatus) {
		self.last_status = status;
	}

	/// Status line for the `status` builtin
	pub fn last_status_line(&self) -> String {
		describe_status(self.last_status)
	}

	pub fn jobs_mut(&mut self) -> &mut JobTable {
		&mut self.jobs
	}

	pub fn home(&self) -> PathBuf {
		env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
	}

	/// Move signal-derived events from the bridge into shell state: child
	/// records update the job table, toggle records flip foreground-only
	/// mode. A record for an untracked pid is a benign race; log and move on.
	pub fn drain_signals(&mut self) -> ShResult<()> {
		for event in self.bridge.poll()? {
			match event {
				BridgeEvent::Child(record) => {
					let status = match WaitStatus::from_raw(record.pid, record.status) {
						Ok(status) => status,
						Err(e) => {
							debug!("undecodable wait status {}: {}", record.status, e);
							continue;
						}
					};
					if let Err(e) = self.jobs.update_status(record.pid, status) {
						debug!("dropping sigchld record: {}", e);
					}
				}
				BridgeEvent::FgMode(on) if on != self.fg_only => {
					self.fg_only = on;
					if on {
						println!("\nEntering foreground-only mode (& is now ignored)");
					} else {
						println!("\nExiting foreground-only mode");
					}
				}
				BridgeEvent::FgMode(_) => {}
			}
		}
		Ok(())
	}
}
