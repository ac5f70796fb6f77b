// SPDX-License-Identifier: Apache-2.0

//! teleclaude-daemon: the long-running process that owns the durable state
//! store, drives every worker loop, and answers the local Unix-socket API.
//! The binary entry point lives in `main.rs`; this crate root exposes the
//! pieces a client (the CLI) needs to talk to it.
//!
//! Cross-host delivery (a linked session whose peer runs under a
//! different daemon) is not implemented here — see `DESIGN.md` for why
//! it was dropped rather than half-built. Every session this daemon
//! knows about is assumed to have a local tmux pane.

pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod workers;

pub use lifecycle::{startup, Config, DaemonState, LifecycleError, StartupResult};
pub use protocol::{Request, Response, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
