//! Command/reply exchange with the companion server.

use std::io::{Read, Write};
use std::net::TcpStream;

use rrpi_protocol::{Command, Reply};

use crate::config::ClientConfig;
use crate::error::Result;

/// An open connection to the companion server.
///
/// Each call writes one command and reads exactly the reply its opcode
/// implies before returning, so calls on one connection never interleave.
pub struct Connection<S = TcpStream> {
    stream: S,
}

impl Connection<TcpStream> {
    /// Connect to the server described by `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(config.address())?;
        stream.set_nodelay(true)?;
        log::debug!("connected to {}", config.address());
        Ok(Connection { stream })
    }

    /// Connect using `RASPBERRY_IP` / `RASPBERRY_PORT`.
    pub fn from_env() -> Result<Self> {
        Self::connect(&ClientConfig::from_env()?)
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S) -> Self {
        Connection { stream }
    }

    /// Send `command` and wait for its reply, if it has one.
    pub fn execute(&mut self, command: &Command) -> Result<Option<Reply>> {
        let frame = command.encode();
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        log::trace!(">> {} ({} bytes)", command.opcode().name(), frame.len());

        let kind = command.reply_kind();
        let mut buf = vec![0u8; kind.wire_len()];
        self.stream.read_exact(&mut buf)?;
        let reply = Reply::decode(kind, &buf)?;
        if kind.wire_len() > 0 {
            log::trace!("<< {} reply bytes", buf.len());
        }
        Ok(reply)
    }

    /// Send a command that has a boolean reply.
    pub(crate) fn execute_bool(&mut self, command: &Command) -> Result<bool> {
        Ok(self
            .execute(command)?
            .and_then(|reply| reply.as_bool())
            .unwrap_or(false))
    }

    /// Send a command that has a data reply.
    pub(crate) fn execute_bytes(&mut self, command: &Command) -> Result<Vec<u8>> {
        Ok(self
            .execute(command)?
            .and_then(Reply::into_bytes)
            .unwrap_or_default())
    }

    /// Borrow the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// In-memory stream for exercising the stubs without a server.
#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Cursor, Read, Write};

    /// Serves canned reply bytes and records everything written.
    pub struct ScriptedStream {
        replies: Cursor<Vec<u8>>,
        pub written: Vec<u8>,
    }

    impl ScriptedStream {
        pub fn new(replies: Vec<u8>) -> Self {
            ScriptedStream {
                replies: Cursor::new(replies),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
