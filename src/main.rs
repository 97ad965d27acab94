use log::debug;

use smallsh::event::EventLoop;

fn main() {
	env_logger::init();

	let mut event_loop = match EventLoop::new() {
		Ok(event_loop) => event_loop,
		Err(e) => {
			eprintln!("{}", e);
			std::process::exit(1);
		}
	};

	debug!("Starting event loop");
	match event_loop.listen() {
		Ok(code) => std::process::exit(code),
		Err(e) => {
			eprintln!("{}", e);
			std::process::exit(1);
		}
	}
}
