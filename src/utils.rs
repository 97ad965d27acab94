use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};

use libc::c_void;

/// Thin owned wrapper over a raw file descriptor. All syscalls go through
/// libc directly; invalid descriptors are represented as `fd == -1`.
#[derive(Hash, Eq, PartialEq, Debug)]
pub struct RustFd {
	fd: RawFd,
}

impl io::Read for RustFd {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if !self.is_valid() {
			return Err(io::Error::new(io::ErrorKind::Other, "Invalid RustFd"));
		}

		loop {
			let result = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
			if result < 0 {
				let err = io::Error::last_os_error();
				if err.kind() == io::ErrorKind::Interrupted {
					continue;
				}
				return Err(err);
			}
			return Ok(result as usize);
		}
	}
}

impl AsFd for RustFd {
	fn as_fd(&self) -> BorrowedFd<'_> {
		unsafe { BorrowedFd::borrow_raw(self.fd) }
	}
}

impl AsRawFd for RustFd {
	fn as_raw_fd(&self) -> RawFd {
		self.fd
	}
}

impl IntoRawFd for RustFd {
	fn into_raw_fd(self) -> RawFd {
		let fd = self.fd;
		std::mem::forget(self);
		fd
	}
}

impl RustFd {
	pub fn new(fd: RawFd) -> io::Result<Self> {
		if fd < 0 {
			return Err(io::Error::new(io::ErrorKind::Other, "Invalid RustFd"));
		}
		Ok(RustFd { fd })
	}

	/// Produce the read and write ends of a nonblocking pipe. Both ends are
	/// close-on-exec; nonblocking matters on both sides, since the write end
	/// is used from signal handler context and the read end is drained by a
	/// zero-timeout poll.
	pub fn pipe() -> io::Result<(Self, Self)> {
		let mut fds = [0; 2];
		let result = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };

		if result == -1 {
			return Err(io::Error::last_os_error());
		}
		let r_fd = RustFd::new(fds[0])?;
		let w_fd = RustFd::new(fds[1])?;
		Ok((r_fd, w_fd))
	}

	/// Open a file read-only, for stdin redirection targets
	pub fn open_read(path: &str) -> io::Result<Self> {
		let c_path = CString::new(path)
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid path: {}", e)))?;
		let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
		if fd < 0 {
			return Err(io::Error::last_os_error());
		}
		RustFd::new(fd)
	}

	/// Open (create/truncate, mode 0660) a file for stdout redirection targets
	pub fn open_write(path: &str) -> io::Result<Self> {
		let c_path = CString::new(path)
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid path: {}", e)))?;
		let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC;
		let fd = unsafe { libc::open(c_path.as_ptr(), flags, 0o660 as libc::c_uint) };
		if fd < 0 {
			return Err(io::Error::last_os_error());
		}
		RustFd::new(fd)
	}

	/// Duplicate `self` onto the given target file descriptor
	pub fn dup2<T: AsRawFd>(&self, target: &T) -> io::Result<()> {
		let target_fd = target.as_raw_fd();
		if self.fd == target_fd {
			// Nothing to do here
			return Ok(());
		}
		if !self.is_valid() || target_fd < 0 {
			return Err(io::Error::new(io::ErrorKind::Other, "Invalid RustFd"));
		}

		let result = unsafe { libc::dup2(self.fd, target_fd) };
		if result < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(())
	}

	pub fn close(&mut self) -> io::Result<()> {
		if !self.is_valid() {
			return Ok(());
		}
		if matches!(self.fd, 0 | 1 | 2) {
			self.fd = -1;
			return Ok(());
		}

		let result = unsafe { libc::close(self.fd) };
		self.fd = -1;
		if result < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(())
	}

	pub fn is_valid(&self) -> bool {
		self.fd >= 0
	}
}

impl Drop for RustFd {
	fn drop(&mut self) {
		let _ = self.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Read;

	#[test]
	fn pipe_is_nonblocking() {
		let (mut r_fd, w_fd) = RustFd::pipe().unwrap();
		let mut buf = [0u8; 8];
		let err = r_fd.read(&mut buf).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
		drop(w_fd);
	}

	#[test]
	fn pipe_round_trip() {
		let (mut r_fd, w_fd) = RustFd::pipe().unwrap();
		let payload = [1u8, 2, 3, 4];
		let written = unsafe { libc::write(w_fd.as_raw_fd(), payload.as_ptr() as *const c_void, payload.len()) };
		assert_eq!(written, 4);
		let mut buf = [0u8; 4];
		assert_eq!(r_fd.read(&mut buf).unwrap(), 4);
		assert_eq!(buf, payload);
	}

	#[test]
	fn close_invalidates() {
		let (mut r_fd, _w_fd) = RustFd::pipe().unwrap();
		r_fd.close().unwrap();
		assert!(!r_fd.is_valid());
	}
}
