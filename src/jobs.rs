use std::ffi::CString;

use log::debug;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::event::ShError;
use crate::ShResult;

/// Human-readable completion line, shared by the `status` builtin and the
/// job table's completion reports
pub fn describe_status(status: WaitStatus) -> String {
	match status {
		WaitStatus::Exited(_, code) => format!("exit value {}", code),
		WaitStatus::Signaled(_, signal, _) => format!("terminated by signal {}", signal as i32),
		WaitStatus::Stopped(_, signal) => format!("stopped by signal {}", signal as i32),
		_ => "running".into(),
	}
}

/// One OS process belonging to a job
#[derive(Debug, Clone, PartialEq)]
pub struct ChildProc {
	argv: Vec<String>,
	pid: Pid,
	completed: bool,
	status: Option<WaitStatus>,
}

impl ChildProc {
	pub fn new(argv: Vec<String>) -> Self {
		Self {
			argv,
			pid: Pid::from_raw(0), // unset until forked
			completed: false,
			status: None,
		}
	}

	pub fn argv(&self) -> &[String] {
		&self.argv
	}

	pub fn argv_cstrings(&self) -> Vec<CString> {
		self.argv
			.iter()
			.map(|arg| CString::new(arg.as_str()).unwrap())
			.collect()
	}

	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn set_pid(&mut self, pid: Pid) {
		self.pid = pid;
	}

	pub fn status(&self) -> Option<WaitStatus> {
		self.status
	}

	pub fn set_status(&mut self, status: WaitStatus) {
		self.status = Some(status);
		self.completed = true;
	}

	pub fn is_complete(&self) -> bool {
		self.completed
	}
}

/// A tracked unit of execution: one process group launched from one statement
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
	command: String,
	proc: ChildProc,
	pgid: Pid,
	stdin_file: Option<String>,
	stdout_file: Option<String>,
	table_id: Option<usize>,
	background: bool,
}

impl Job {
	pub fn command(&self) -> &str {
		&self.command
	}

	pub fn proc(&self) -> &ChildProc {
		&self.proc
	}

	pub fn proc_mut(&mut self) -> &mut ChildProc {
		&mut self.proc
	}

	pub fn pid(&self) -> Pid {
		self.proc.pid()
	}

	pub fn set_pid(&mut self, pid: Pid) {
		self.proc.set_pid(pid);
	}

	/// A zero pgid means the spawned process becomes its own group leader
	pub fn pgid(&self) -> Pid {
		self.pgid
	}

	pub fn set_pgid(&mut self, pgid: Pid) {
		self.pgid = pgid;
	}

	pub fn stdin_file(&self) -> Option<&str> {
		self.stdin_file.as_deref()
	}

	pub fn stdout_file(&self) -> Option<&str> {
		self.stdout_file.as_deref()
	}

	pub fn table_id(&self) -> Option<usize> {
		self.table_id
	}

	pub fn is_background(&self) -> bool {
		self.background
	}

	pub fn is_complete(&self) -> bool {
		self.proc.is_complete()
	}

	pub fn killpg(&self, signal: Signal) -> ShResult<()> {
		killpg(self.pgid, signal)
			.map_err(|e| ShError::JobControl(format!("failed to signal pgid {}: {}", self.pgid, e)))
	}

	/// Completion report for finished background jobs
	pub fn display_done(&self) -> String {
		let status_line = self
			.proc
			.status()
			.map(describe_status)
			.unwrap_or_else(|| "done".into());
		format!("background pid {} is done: {}", self.pid(), status_line)
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	command: String,
	argv: Vec<String>,
	pgid: Pid,
	stdin_file: Option<String>,
	stdout_file: Option<String>,
	background: bool,
}

impl JobBuilder {
	pub fn new() -> Self {
		Self {
			command: String::new(),
			argv: Vec::new(),
			pgid: Pid::from_raw(0),
			stdin_file: None,
			stdout_file: None,
			background: false,
		}
	}

	pub fn with_command(mut self, command: impl Into<String>) -> Self {
		self.command = command.into();
		self
	}

	pub fn with_argv(mut self, argv: Vec<String>) -> Self {
		self.argv = argv;
		self
	}

	pub fn with_pgid(mut self, pgid: Pid) -> Self {
		self.pgid = pgid;
		self
	}

	pub fn with_stdin(mut self, file: Option<String>) -> Self {
		self.stdin_file = file;
		self
	}

	pub fn with_stdout(mut self, file: Option<String>) -> Self {
		self.stdout_file = file;
		self
	}

	pub fn background(mut self, background: bool) -> Self {
		self.background = background;
		self
	}

	pub fn build(self) -> Job {
		Job {
			command: self.command,
			proc: ChildProc::new(self.argv),
			pgid: self.pgid,
			stdin_file: self.stdin_file,
			stdout_file: self.stdout_file,
			table_id: None,
			background: self.background,
		}
	}
}

impl Default for JobBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobID {
	Pgid(Pid),
	Pid(Pid),
	TableID(usize),
}

/// Registry of in-flight jobs. Mutated from the main thread only; the
/// signal path reaches it through the bridge, never directly.
#[derive(Debug, Default)]
pub struct JobTable {
	jobs: Vec<Job>,
	last_id: usize,
}

impl JobTable {
	pub fn new() -> Self {
		Self {
			jobs: Vec::new(),
			last_id: 0,
		}
	}

	/// Insert a job, assigning the next job spec number. Numbering restarts
	/// at 1 whenever the table has emptied out.
	pub fn insert_job(&mut self, mut job: Job) -> usize {
		let id = if self.jobs.is_empty() { 1 } else { self.last_id + 1 };
		self.last_id = id;
		job.table_id = Some(id);
		debug!("tracking job [{}] pgid {} ({})", id, job.pgid(), job.command());
		self.jobs.push(job);
		id
	}

	pub fn query(&self, id: JobID) -> Option<&Job> {
		self.jobs.iter().find(|job| Self::matches(job, &id))
	}

	pub fn query_mut(&mut self, id: JobID) -> Option<&mut Job> {
		self.jobs.iter_mut().find(|job| Self::matches(job, &id))
	}

	fn matches(job: &Job, id: &JobID) -> bool {
		match id {
			JobID::Pgid(pgid) => job.pgid() == *pgid,
			JobID::Pid(pid) => job.pid() == *pid,
			JobID::TableID(table_id) => job.table_id() == Some(*table_id),
		}
	}

	/// Record a wait status against the tracked job owning `pid`. Not
	/// finding one is a recoverable condition; the signal path can race
	/// ahead of table population.
	pub fn update_status(&mut self, pid: Pid, status: WaitStatus) -> ShResult<()> {
		match self.query_mut(JobID::Pid(pid)) {
			Some(job) => {
				job.proc_mut().set_status(status);
				Ok(())
			}
			None => Err(ShError::Internal(format!("no tracked job for pid {}", pid))),
		}
	}

	/// Report and remove every completed job
	pub fn clean(&mut self) {
		for job in self.jobs.iter().filter(|job| job.is_complete()) {
			println!("{}", job.display_done());
		}
		self.jobs.retain(|job| !job.is_complete());
	}

	/// Terminate every tracked process group; used at shell shutdown
	pub fn killall(&mut self) {
		for job in &self.jobs {
			let _ = job.killpg(Signal::SIGTERM);
		}
		self.jobs.clear();
	}

	pub fn jobs(&self) -> &[Job] {
		&self.jobs
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn job(argv: &[&str], pgid: i32) -> Job {
		JobBuilder::new()
			.with_command(argv.join(" "))
			.with_argv(argv.iter().map(|s| s.to_string()).collect())
			.with_pgid(Pid::from_raw(pgid))
			.background(true)
			.build()
	}

	#[test]
	fn insert_assigns_monotonic_ids() {
		let mut table = JobTable::new();
		assert_eq!(table.insert_job(job(&["sleep", "10"], 100)), 1);
		assert_eq!(table.insert_job(job(&["sleep", "20"], 200)), 2);
		assert!(table.jobs().iter().all(Job::is_background));
	}

	#[test]
	fn ids_restart_when_table_empties() {
		let mut table = JobTable::new();
		table.insert_job(job(&["a"], 100));
		table.insert_job(job(&["b"], 200));
		table
			.query_mut(JobID::Pgid(Pid::from_raw(100)))
			.unwrap()
			.set_pid(Pid::from_raw(100));
		table
			.query_mut(JobID::Pgid(Pid::from_raw(200)))
			.unwrap()
			.set_pid(Pid::from_raw(200));
		table
			.update_status(Pid::from_raw(100), WaitStatus::Exited(Pid::from_raw(100), 0))
			.unwrap();
		table
			.update_status(Pid::from_raw(200), WaitStatus::Exited(Pid::from_raw(200), 0))
			.unwrap();
		table.clean();
		assert!(table.is_empty());
		assert_eq!(table.insert_job(job(&["c"], 300)), 1);
	}

	#[test]
	fn clean_keeps_unfinished_jobs_and_their_ids() {
		let mut table = JobTable::new();
		let first_pid = Pid::from_raw(100);
		table.insert_job(job(&["first"], 100));
		let second_id = table.insert_job(job(&["second"], 200));

		let first = table.query_mut(JobID::Pgid(first_pid)).unwrap();
		first.set_pid(first_pid);
		table
			.update_status(first_pid, WaitStatus::Exited(first_pid, 0))
			.unwrap();
		table.clean();

		assert_eq!(table.jobs().len(), 1);
		let survivor = &table.jobs()[0];
		assert_eq!(survivor.command(), "second");
		assert_eq!(survivor.table_id(), Some(second_id));
	}

	#[test]
	fn update_status_for_unknown_pid_is_an_error() {
		let mut table = JobTable::new();
		let pid = Pid::from_raw(424242);
		let result = table.update_status(pid, WaitStatus::Exited(pid, 0));
		assert!(result.is_err());
	}

	#[test]
	fn query_by_pgid_pid_and_table_id() {
		let mut table = JobTable::new();
		let id = table.insert_job(job(&["sleep", "10"], 300));
		table
			.query_mut(JobID::TableID(id))
			.unwrap()
			.set_pid(Pid::from_raw(301));

		assert!(table.query(JobID::Pgid(Pid::from_raw(300))).is_some());
		assert!(table.query(JobID::Pid(Pid::from_raw(301))).is_some());
		assert!(table.query(JobID::Pid(Pid::from_raw(300))).is_none());
		assert!(table.query(JobID::TableID(id + 1)).is_none());
	}

	#[test]
	fn describe_status_formats() {
		let pid = Pid::from_raw(1);
		assert_eq!(describe_status(WaitStatus::Exited(pid, 0)), "exit value 0");
		assert_eq!(describe_status(WaitStatus::Exited(pid, 1)), "exit value 1");
		assert_eq!(
			describe_status(WaitStatus::Signaled(pid, Signal::SIGTERM, false)),
			"terminated by signal 15"
		);
	}
}
