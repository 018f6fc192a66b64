//! Election state machine and the uniform `execute` entry point.
//!
//! On startup every invocation races for the lock file. The winner
//! becomes the leader: it binds a listener, records its port and session
//! password, and serves follower connections until the process exits.
//! Every loser becomes a follower: it reads the record, handshakes with
//! the leader, and later forwards its own argument vector over that
//! connection instead of running independently.
//!
//! A follower-path failure at any step (garbage record, refused
//! connection, wrong banner) is read as "leader died without cleaning
//! up": the lock file is deleted and the whole election retried, a
//! bounded number of times.

use log::{error, info, warn};
use std::sync::{Arc, Mutex};

use crate::client::LeaderConnection;
use crate::config::InstanceConfig;
use crate::error::{InstanceError, InstanceResult};
use crate::listener::{DispatchFn, make_password, open_socket, spawn_listener};
use crate::lockfile::{LockFile, LockGuard, LockRecord, LockState};

/// Application callback invoked once per command with the decoded
/// argument vector. Its return value is ignored.
pub type ExecFunc<A> = Arc<dyn Fn(&A, &[String]) + Send + Sync>;

/// Observable state of a [`CommandExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// `setup` has not completed yet.
    Unset,
    /// This process won the election and is serving followers.
    Leader,
    /// A leader is already running; this process holds a one-shot
    /// connection to it.
    Follower,
    /// The election exhausted its retries.
    Fatal,
}

enum Role<A> {
    Unset,
    Leader {
        execfunc: ExecFunc<A>,
        _guard: LockGuard,
    },
    Follower {
        conn: Option<LeaderConnection>,
    },
    Fatal,
}

/// Runs the leader/follower election and exposes `execute(argv)`
/// regardless of which role this process ended up with.
///
/// The application object is attached separately via [`set_app`]
/// because it is typically constructed only after the election decides
/// whether this invocation keeps running at all.
///
/// [`set_app`]: CommandExecutor::set_app
pub struct CommandExecutor<A> {
    config: InstanceConfig,
    app: Arc<Mutex<Option<A>>>,
    role: Mutex<Role<A>>,
}

impl<A: Send + 'static> CommandExecutor<A> {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            app: Arc::new(Mutex::new(None)),
            role: Mutex::new(Role::Unset),
        }
    }

    /// Attach the application object that leader-side dispatch calls
    /// into.
    pub fn set_app(&self, app: A) {
        *self.app.lock().unwrap() = Some(app);
    }

    pub fn state(&self) -> ExecutorState {
        match &*self.role.lock().unwrap() {
            Role::Unset => ExecutorState::Unset,
            Role::Leader { .. } => ExecutorState::Leader,
            Role::Follower { .. } => ExecutorState::Follower,
            Role::Fatal => ExecutorState::Fatal,
        }
    }

    /// Run the election. Returns `Ok(true)` if this process is the
    /// leader, `Ok(false)` if a leader was already running and this
    /// process should forward its command and exit.
    ///
    /// Blocks until the role is decided; for the leader that includes
    /// starting the accept loop, for the follower the whole handshake.
    /// OS-level failures on the leader path and port exhaustion are
    /// fatal; follower-path failures trigger stale-lock recovery and a
    /// bounded retry.
    pub fn setup(&self, execfunc: ExecFunc<A>) -> InstanceResult<bool> {
        let lock = LockFile::new(&self.config.lock_path);

        for attempt in 1..=self.config.election_tries {
            match lock.acquire_or_read()? {
                LockState::Acquired(mut file) => {
                    let password = make_password();
                    let (listener, port) = open_socket(
                        self.config.start_port,
                        self.config.end_port,
                        self.config.bind_tries,
                    )?;
                    let record = LockRecord {
                        port,
                        password: password.clone(),
                    };
                    LockFile::write_record(&mut file, &record)?;

                    // Remote commands go through the listener's ordered
                    // dispatcher; it shares the app slot with the local
                    // execute path.
                    let app = Arc::clone(&self.app);
                    let func = Arc::clone(&execfunc);
                    let dispatch: DispatchFn = Arc::new(move |argv: Vec<String>| {
                        match &*app.lock().unwrap() {
                            Some(app) => func(app, &argv),
                            None => warn!(
                                "dropping remote command, application not attached yet: {:?}",
                                argv
                            ),
                        }
                    });
                    spawn_listener(listener, password, dispatch);

                    *self.role.lock().unwrap() = Role::Leader {
                        execfunc,
                        _guard: lock.guard(),
                    };
                    info!("elected leader, listening on port {}", port);
                    return Ok(true);
                }
                LockState::Existing(mut file) => {
                    let record = LockFile::read_record(&mut file);
                    drop(file);

                    match record.and_then(|r| LeaderConnection::connect(&r)) {
                        Ok(conn) => {
                            *self.role.lock().unwrap() = Role::Follower { conn: Some(conn) };
                            info!("leader already running, will forward command");
                            return Ok(false);
                        }
                        Err(e) => {
                            // Treat as "leader died without cleanup":
                            // purge the lock and race again.
                            warn!("stale lock file (attempt {}): {}", attempt, e);
                            if let Err(e) = lock.remove() {
                                error!("failed to remove stale lock file: {}", e);
                            }
                        }
                    }
                }
            }
        }

        *self.role.lock().unwrap() = Role::Fatal;
        Err(InstanceError::LockUnavailable(self.config.election_tries))
    }

    /// Run one command through whichever role `setup` decided.
    ///
    /// Leader: invoke the application callback synchronously in the
    /// calling thread. Follower: encode and send the command over the
    /// connection opened during `setup`; a second call fails with
    /// [`InstanceError::AlreadySent`].
    pub fn execute(&self, argv: &[String]) -> InstanceResult<()> {
        let mut role = self.role.lock().unwrap();
        match &mut *role {
            Role::Unset | Role::Fatal => Err(InstanceError::NotReady),
            Role::Leader { execfunc, .. } => {
                let execfunc = Arc::clone(execfunc);
                drop(role);
                match &*self.app.lock().unwrap() {
                    Some(app) => execfunc(app, argv),
                    None => warn!("dropping command, application not attached yet: {:?}", argv),
                }
                Ok(())
            }
            Role::Follower { conn } => match conn.take() {
                Some(conn) => {
                    drop(role);
                    conn.send_command(argv)
                }
                None => Err(InstanceError::AlreadySent),
            },
        }
    }
}

/// Build an executor, run the election, and return
/// `(is_leader, executor)` in one call.
pub fn get_command_executor<A: Send + 'static>(
    config: InstanceConfig,
    execfunc: ExecFunc<A>,
) -> InstanceResult<(bool, CommandExecutor<A>)> {
    let executor = CommandExecutor::new(config);
    let is_leader = executor.setup(execfunc)?;
    Ok((is_leader, executor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_before_setup() {
        let executor: CommandExecutor<()> =
            CommandExecutor::new(InstanceConfig::new("/tmp/unused.lock"));
        assert_eq!(executor.state(), ExecutorState::Unset);
        assert!(matches!(
            executor.execute(&["noop".to_string()]),
            Err(InstanceError::NotReady)
        ));
    }
}
