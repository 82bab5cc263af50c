//! # rmtdos-server
//!
//! Resident service that serves an 80×25 style text screen to rmtdos
//! clients and types their keystrokes into it.
//!
//! Frames travel over a UDP link adapter standing in for the raw Ethernet
//! packet driver: one datagram per frame, link header included.
//!
//! ## Tasks
//!
//! - **Receiver**: copies each datagram into the buffer pool.
//! - **Mainline**: drains the pool through the engine's dispatcher and
//!   runs the screen streamer on a fixed tick.

pub mod config;
pub mod link;
pub mod screen;
pub mod service;
