//! Follower-side connection to the running leader.
//!
//! A follower performs the whole handshake synchronously while the
//! election is still being decided: connect, check the banner, present
//! the password. The command itself is sent later, once, through
//! [`LeaderConnection::send_command`].

use log::debug;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::codec::format_command;
use crate::error::{InstanceError, InstanceResult};
use crate::listener::PROTOCOL_HEADER;
use crate::lockfile::LockRecord;

/// An authenticated connection to the leader, ready to carry one command.
#[derive(Debug)]
pub struct LeaderConnection {
    stream: TcpStream,
}

impl LeaderConnection {
    /// Connect to the leader named by `record` and complete the
    /// handshake.
    ///
    /// The first line from the peer must equal the protocol banner
    /// exactly; anything else means the record points at an unrelated
    /// service and the attempt fails with
    /// [`InstanceError::HeaderMismatch`].
    pub fn connect(record: &LockRecord) -> InstanceResult<Self> {
        let stream = TcpStream::connect(("127.0.0.1", record.port))?;
        let mut reader = BufReader::new(stream.try_clone()?);

        let mut header = String::new();
        reader.read_line(&mut header)?;
        if header != PROTOCOL_HEADER {
            return Err(InstanceError::HeaderMismatch);
        }

        let mut stream = stream;
        stream.write_all(format!("{}\n", record.password).as_bytes())?;
        stream.flush()?;
        debug!("handshake with leader on port {} complete", record.port);

        Ok(Self { stream })
    }

    /// Encode `argv`, send it as one line, and close the connection.
    ///
    /// The leader never replies; closing right after the write is the
    /// whole exchange.
    pub fn send_command(mut self, argv: &[String]) -> InstanceResult<()> {
        let line = format!("{}\n", format_command(argv));
        self.stream.write_all(line.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }
}
