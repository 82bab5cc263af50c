//! # rmtdos-client
//!
//! Companion client for an rmtdos server. Finds servers with a broadcast
//! StatusRequest, pings them, and in watch mode keeps a session alive,
//! mirrors the remote text screen and forwards typed lines as keystrokes.

pub mod client;
pub mod config;
pub mod watch;
