use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, IntoRawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use log::trace;
use nix::errno::Errno;
use nix::sys::select::{select, FdSet};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::time::TimeVal;
use nix::unistd::Pid;

use crate::event::ShError;
use crate::utils::RustFd;
use crate::ShResult;

pub const SIGCHLD_RECORD_LEN: usize = 8;

// The write ends of the bridge pipes. Signal handlers cannot capture state,
// so these two descriptors are the only process-wide mutable statics.
static SIGCHLD_TX: AtomicI32 = AtomicI32::new(-1);
static SIGTSTP_TX: AtomicI32 = AtomicI32::new(-1);

/// One reaped child, moved out of handler context through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigchldRecord {
	pub pid: Pid,
	pub status: i32,
}

impl SigchldRecord {
	fn from_bytes(buf: &[u8; SIGCHLD_RECORD_LEN]) -> Self {
		let pid = i32::from_ne_bytes(buf[..4].try_into().unwrap());
		let status = i32::from_ne_bytes(buf[4..].try_into().unwrap());
		Self {
			pid: Pid::from_raw(pid),
			status,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
	Child(SigchldRecord),
	FgMode(bool),
}

/// Self-pipe channel between signal handler context and the main loop.
/// Handlers write fixed-size records into the nonblocking write ends; the
/// main loop drains the read ends with a zero-timeout readiness poll.
#[derive(Debug)]
pub struct SignalBridge {
	chld_rx: RustFd,
	tstp_rx: RustFd,
}

impl SignalBridge {
	pub fn new() -> ShResult<Self> {
		let (chld_rx, chld_tx) = RustFd::pipe().map_err(|e| ShError::from_io(&e))?;
		let (tstp_rx, tstp_tx) = RustFd::pipe().map_err(|e| ShError::from_io(&e))?;
		SIGCHLD_TX.store(chld_tx.into_raw_fd(), Ordering::SeqCst);
		SIGTSTP_TX.store(tstp_tx.into_raw_fd(), Ordering::SeqCst);
		Ok(Self { chld_rx, tstp_rx })
	}

	/// Drain every complete record currently sitting in the bridge without
	/// ever blocking. Events come back in arrival order per channel.
	pub fn poll(&mut self) -> ShResult<Vec<BridgeEvent>> {
		let mut events = Vec::new();
		loop {
			// select() consumes readiness state, so the fd set has to be
			// rebuilt from scratch on every pass
			let mut readfds = FdSet::new();
			readfds.insert(self.chld_rx.as_fd());
			readfds.insert(self.tstp_rx.as_fd());
			let mut timeout = TimeVal::new(0, 0);

			let ready = match select(None, Some(&mut readfds), None, None, Some(&mut timeout)) {
				Ok(n) => n,
				Err(Errno::EINTR) => continue,
				Err(e) => {
					return Err(ShError::JobControl(format!("select failed on signal bridge: {}", e)))
				}
			};
			if ready == 0 {
				break;
			}

			let chld_ready = readfds.contains(self.chld_rx.as_fd());
			let tstp_ready = readfds.contains(self.tstp_rx.as_fd());
			if chld_ready {
				self.drain_chld(&mut events)?;
			}
			if tstp_ready {
				self.drain_tstp(&mut events)?;
			}
		}
		Ok(events)
	}

	fn drain_chld(&mut self, events: &mut Vec<BridgeEvent>) -> ShResult<()> {
		let mut buf = [0u8; SIGCHLD_RECORD_LEN];
		loop {
			match self.chld_rx.read(&mut buf) {
				Ok(0) => break,
				Ok(n) if n == SIGCHLD_RECORD_LEN => {
					let record = SigchldRecord::from_bytes(&buf);
					trace!("bridge: pid {} raw status {}", record.pid, record.status);
					events.push(BridgeEvent::Child(record));
				}
				Ok(n) => {
					return Err(ShError::Internal(format!(
						"short read of {} bytes on sigchld bridge",
						n
					)))
				}
				Err(e) if e.kind() == ErrorKind::WouldBlock => break,
				Err(e) => return Err(ShError::from_io(&e)),
			}
		}
		Ok(())
	}

	fn drain_tstp(&mut self, events: &mut Vec<BridgeEvent>) -> ShResult<()> {
		let mut buf = [0u8; 1];
		loop {
			match self.tstp_rx.read(&mut buf) {
				Ok(0) => break,
				Ok(_) => events.push(BridgeEvent::FgMode(buf[0] != 0)),
				Err(e) if e.kind() == ErrorKind::WouldBlock => break,
				Err(e) => return Err(ShError::from_io(&e)),
			}
		}
		Ok(())
	}
}

/// Install the shell's signal dispositions. The shell itself shrugs off
/// terminal-generated signals; children reset their own dispositions after
/// the fork.
pub fn sig_handler_setup() -> ShResult<()> {
	unsafe {
		set_handler(Signal::SIGCHLD, SigHandler::Handler(handle_sigchld))?;
		set_handler(Signal::SIGTSTP, SigHandler::Handler(handle_sigtstp_enable))?;
		set_handler(Signal::SIGINT, SigHandler::SigIgn)?;
		set_handler(Signal::SIGQUIT, SigHandler::SigIgn)?;
		set_handler(Signal::SIGTTIN, SigHandler::SigIgn)?;
		set_handler(Signal::SIGTTOU, SigHandler::SigIgn)?;
	}
	Ok(())
}

unsafe fn set_handler(sig: Signal, handler: SigHandler) -> ShResult<()> {
	signal(sig, handler)
		.map(|_| ())
		.map_err(|e| ShError::JobControl(format!("failed to install {} handler: {}", sig, e)))
}

/// Swap SIGCHLD to a do-nothing handler for the duration of a foreground
/// wait, so the synchronous wait loop is the only reaper. SIG_IGN would not
/// do: it makes the kernel reap implicitly, stealing the status we want.
pub fn disable_reaping() -> ShResult<()> {
	unsafe { set_handler(Signal::SIGCHLD, SigHandler::Handler(ignore_sigchld)) }
}

/// Restore bridge-fed reaping, then run one drain by hand to pick up any
/// children that exited while the no-op handler was installed
pub fn enable_reaping() -> ShResult<()> {
	unsafe { set_handler(Signal::SIGCHLD, SigHandler::Handler(handle_sigchld))? };
	handle_sigchld(libc::SIGCHLD);
	Ok(())
}

pub extern "C" fn ignore_sigchld(_: libc::c_int) {
	// Do nothing; see disable_reaping()
}

/// Async-signal-safe SIGCHLD handler: reap everything reapable and push one
/// record per child into the bridge. Nothing else is allowed in here.
pub extern "C" fn handle_sigchld(_: libc::c_int) {
	let fd = SIGCHLD_TX.load(Ordering::Relaxed);
	if fd < 0 {
		return;
	}
	loop {
		let mut status: libc::c_int = 0;
		let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
		if pid <= 0 {
			break;
		}
		let mut record = [0u8; SIGCHLD_RECORD_LEN];
		record[..4].copy_from_slice(&(pid as i32).to_ne_bytes());
		record[4..].copy_from_slice(&status.to_ne_bytes());
		unsafe { libc::write(fd, record.as_ptr() as *const libc::c_void, record.len()) };
	}
}

// SIGTSTP toggles foreground-only mode. Each delivery writes the new mode
// into the bridge and arms the opposite handler for the next delivery.
extern "C" fn handle_sigtstp_enable(_: libc::c_int) {
	let fd = SIGTSTP_TX.load(Ordering::Relaxed);
	if fd >= 0 {
		let on = [1u8];
		unsafe { libc::write(fd, on.as_ptr() as *const libc::c_void, 1) };
	}
	unsafe {
		let _ = signal(Signal::SIGTSTP, SigHandler::Handler(handle_sigtstp_disable));
	}
}

extern "C" fn handle_sigtstp_disable(_: libc::c_int) {
	let fd = SIGTSTP_TX.load(Ordering::Relaxed);
	if fd >= 0 {
		let off = [0u8];
		unsafe { libc::write(fd, off.as_ptr() as *const libc::c_void, 1) };
	}
	unsafe {
		let _ = signal(Signal::SIGTSTP, SigHandler::Handler(handle_sigtstp_enable));
	}
}
