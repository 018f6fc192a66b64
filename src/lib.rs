//! # soliton
//!
//! Soliton is single-instance coordination for desktop applications:
//! when the application is launched a second time by the same user, the
//! new invocation detects the running instance, forwards its
//! command-line arguments to it over a localhost connection, and exits.
//!
//! ## How it works
//!
//! - **Lock file**: every invocation races to create a per-user lock
//!   file exclusively. The winner is the *leader*; it writes its
//!   listening port and a session password into the file as
//!   `"<port>:<password>"`.
//! - **Listener**: the leader binds a random localhost port and accepts
//!   short-lived connections for the lifetime of the process, one
//!   handler thread per connection, with a single dispatcher thread
//!   delivering decoded commands to the application in order.
//! - **Forwarding**: every later invocation (*follower*) reads the lock
//!   record, handshakes with the leader, sends its argument vector as
//!   one escaped line, and exits.
//! - **Stale-lock recovery**: a lock file whose record is garbage or
//!   points at a dead listener is deleted and the election retried, a
//!   bounded number of times.
//!
//! The session password only repels accidental connections from
//! unrelated local programs; it is not a defence against a hostile
//! local actor.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use soliton::{ExecFunc, InstanceConfig, get_command_executor};
//!
//! struct App;
//!
//! impl App {
//!     fn handle_command(&self, argv: &[String]) {
//!         println!("command: {:?}", argv);
//!     }
//! }
//!
//! let config = InstanceConfig::new("/tmp/myapp.lock");
//! let execfunc: ExecFunc<App> = Arc::new(|app, argv| app.handle_command(argv));
//! let (is_leader, executor) = get_command_executor(config, execfunc).unwrap();
//!
//! if is_leader {
//!     executor.set_app(App);
//!     // run the main event loop; forwarded commands arrive on the
//!     // listener's dispatcher thread
//! } else {
//!     // forward this invocation's arguments and exit
//!     executor.execute(&["open".to_string()]).unwrap();
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod lockfile;

pub use client::LeaderConnection;
pub use config::InstanceConfig;
pub use error::{InstanceError, InstanceResult};
pub use executor::{CommandExecutor, ExecFunc, ExecutorState, get_command_executor};
pub use listener::{DispatchFn, PROTOCOL_HEADER, make_password, open_socket, spawn_listener};
pub use lockfile::{LockFile, LockGuard, LockRecord, LockState};
