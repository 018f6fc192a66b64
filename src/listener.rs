//! Leader-side socket listener.
//!
//! The leader binds a random localhost port, records it in the lock file,
//! and accepts short-lived connections from follower invocations for the
//! lifetime of the process. Each accepted connection carries exactly one
//! password check and one encoded command.
//!
//! The session password is a random decimal integer. It only has to repel
//! accidental connections from unrelated local programs; it is a
//! collision-avoidance token, not a security boundary, and the protocol
//! makes no attempt to resist a hostile local peer.
//!
//! Decoded commands are not dispatched from the handler threads directly:
//! every handler enqueues its argv onto one channel consumed by a single
//! dispatcher thread, so commands reach the application one at a time in
//! channel order even when many followers connect at once.

use log::{debug, error, warn};
use rand::Rng;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use crate::codec::parse_command;
use crate::error::{InstanceError, InstanceResult};

/// Banner the leader writes immediately after accepting a connection, so
/// a follower can tell a compatible listener from an unrelated service.
pub const PROTOCOL_HEADER: &str = "keepnote\n";

/// Sink for decoded argument vectors arriving over the wire.
pub type DispatchFn = Arc<dyn Fn(Vec<String>) + Send + Sync>;

/// Bind a TCP listener to a random localhost port in
/// `[start_port, end_port]`.
///
/// Each attempt picks a uniformly random port in the range; the first
/// successful bind wins. After `tries` failures this returns
/// [`InstanceError::NoSocket`], which the caller must treat as fatal: a
/// leader with no listening port cannot serve followers.
///
/// # Panics
/// Panics if `start_port > end_port`.
pub fn open_socket(
    start_port: u16,
    end_port: u16,
    tries: u32,
) -> InstanceResult<(TcpListener, u16)> {
    let mut rng = rand::thread_rng();

    for _ in 0..tries {
        let port = rng.gen_range(start_port..=end_port);
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                debug!("command listener bound to 127.0.0.1:{}", port);
                return Ok((listener, port));
            }
            Err(e) => debug!("port {} unavailable: {}", port, e),
        }
    }

    Err(InstanceError::NoSocket {
        start: start_port,
        end: end_port,
        tries,
    })
}

/// Generate a session password: a random decimal integer in
/// `[0, 1_000_000)` rendered as a string.
pub fn make_password() -> String {
    rand::thread_rng().gen_range(0..1_000_000u32).to_string()
}

/// Start serving follower connections on `listener`.
///
/// Spawns the accept loop on a dedicated thread plus one handler thread
/// per accepted connection (unbounded, no backpressure) and a single
/// dispatcher thread that feeds decoded commands to `dispatch` in order.
/// There is no shutdown path; the loop runs until the process exits.
pub fn spawn_listener(listener: TcpListener, password: String, dispatch: DispatchFn) {
    let (commands_tx, commands_rx) = mpsc::channel::<Vec<String>>();

    thread::spawn(move || {
        for argv in commands_rx {
            dispatch(argv);
        }
        debug!("command dispatcher stopped");
    });

    thread::spawn(move || {
        loop {
            // Transient accept failures are retried; nothing else may
            // take the loop down.
            let stream = match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("accepted command connection from {}", addr);
                    stream
                }
                Err(e) => {
                    warn!("accept failed, retrying: {}", e);
                    continue;
                }
            };

            let password = password.clone();
            let commands_tx = commands_tx.clone();
            thread::spawn(move || {
                if let Err(e) = process_connection(stream, &password, &commands_tx) {
                    error!("error with connection: {}", e);
                }
            });
        }
    });
}

/// Run the per-connection handshake: banner out, password line in,
/// command line in.
///
/// A wrong password closes the connection silently; no bytes are sent
/// back, so a probing peer learns nothing. Socket errors propagate to the
/// handler thread, which logs them; they never reach the accept loop.
fn process_connection(
    stream: TcpStream,
    password: &str,
    commands: &mpsc::Sender<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut stream = stream;

    stream.write_all(PROTOCOL_HEADER.as_bytes())?;
    stream.flush()?;

    let mut claimed = String::new();
    reader.read_line(&mut claimed)?;
    if claimed.strip_suffix('\n').unwrap_or(&claimed) != password {
        debug!("rejected connection with wrong password");
        return Ok(());
    }

    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.strip_suffix('\n').unwrap_or(&line);
    let argv = parse_command(line);

    // Fails only if the dispatcher is gone, which means the process is
    // already tearing down.
    let _ = commands.send(argv);
    Ok(())
}
