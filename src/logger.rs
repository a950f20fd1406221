/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Tinix.
 *
 * Tinix is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Tinix is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Tinix. If not, see <https://www.gnu.org/licenses/>.
 */

//! Kernel logging.
//!
//! If the logger is set as silent, logs will not show up on the console, but
//! are kept in memory anyway, in a fixed-capacity ring buffer.

use crate::sync::Mutex;
use std::fmt::Write;

/// The size of the kernel logs buffer in bytes.
const LOGS_SIZE: usize = 64 * 1024;

/// The kernel's logger.
pub static LOGGER: Mutex<Logger> = Mutex::new(Logger::new());

/// Kernel logger, used to print/store kernel logs.
///
/// Internally, the logger uses a ring buffer for storage: once full, the
/// oldest bytes are overwritten by the newest.
pub struct Logger {
	/// Tells whether the logger is silent (logs are still recorded).
	pub silent: bool,
	buf: Vec<u8>,
	write_head: usize,
	len: usize,
}

impl Logger {
	/// Creates a new, empty logger.
	pub const fn new() -> Self {
		Self {
			silent: false,
			buf: Vec::new(),
			write_head: 0,
			len: 0,
		}
	}

	fn push_byte(&mut self, b: u8) {
		if self.buf.len() < LOGS_SIZE {
			self.buf.push(b);
		} else {
			self.buf[self.write_head] = b;
		}
		self.write_head = (self.write_head + 1) % LOGS_SIZE;
		self.len = (self.len + 1).min(LOGS_SIZE);
	}

	/// Appends `s` to the ring buffer, and to the console unless silent.
	pub fn write_str(&mut self, s: &str) {
		for b in s.bytes() {
			self.push_byte(b);
		}
		if !self.silent {
			print!("{s}");
		}
	}

	/// Returns the logs currently held in the ring buffer, oldest first.
	pub fn history(&self) -> String {
		let start = if self.buf.len() < LOGS_SIZE {
			0
		} else {
			self.write_head
		};
		let bytes: Vec<u8> = (0..self.len)
			.map(|i| self.buf[(start + i) % self.buf.len().max(1)])
			.collect();
		String::from_utf8_lossy(&bytes).into_owned()
	}
}

impl Write for Logger {
	fn write_str(&mut self, s: &str) -> std::fmt::Result {
		Logger::write_str(self, s);
		Ok(())
	}
}

/// Writes a formatted line into the global logger at the given level tag.
pub fn log_line(level: &str, args: std::fmt::Arguments<'_>) {
	let mut logger = LOGGER.lock();
	let _ = writeln!(logger, "[{level}] {args}");
}

/// Logs an informational message.
#[macro_export]
macro_rules! log {
	($($arg:tt)*) => {
		$crate::logger::log_line("info", format_args!($($arg)*))
	};
}

/// Logs a warning.
#[macro_export]
macro_rules! log_warn {
	($($arg:tt)*) => {
		$crate::logger::log_line("warn", format_args!($($arg)*))
	};
}

/// Logs an error.
#[macro_export]
macro_rules! log_err {
	($($arg:tt)*) => {
		$crate::logger::log_line("error", format_args!($($arg)*))
	};
}
