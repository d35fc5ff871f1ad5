//! One client connection: read commands, execute them in order, write replies.
//!
//! Commands are executed strictly in arrival order and each reply is written
//! before the next command is read. A handler failure is logged and answered
//! with a filler reply of the expected length so the client stays in step;
//! a frame dropped for an invalid payload is answered the same way.
//! An undecodable opcode ends the session, since the length of its payload
//! is unknown and the stream can no longer be framed.

use std::io::{self, Read, Write};
use std::time::Instant;

use rrpi_protocol::{Command, CommandCodec, Reply, SizeMode};
use tracing::{debug, info, trace, warn};

use crate::bus::SpiTransport;
use crate::dispatch::Dispatcher;
use crate::error::SessionError;
use crate::metrics::metric_defs;
use crate::radio::RadioDevice;

/// Socket read size.
const READ_CHUNK: usize = 4096;

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Commands dispatched.
    pub commands: u64,
    /// Commands whose handler failed.
    pub handler_errors: u64,
    /// Frames dropped for a malformed payload.
    pub malformed_frames: u64,
    /// Bytes read from the peer.
    pub bytes_received: u64,
    /// Reply bytes written to the peer.
    pub bytes_sent: u64,
}

/// A client session over any byte stream.
pub struct Session<S, T, D> {
    id: u64,
    stream: S,
    codec: CommandCodec,
    dispatcher: Dispatcher<T, D>,
    summary: SessionSummary,
}

impl<S, T, D> Session<S, T, D>
where
    S: Read + Write,
    T: SpiTransport,
    D: RadioDevice,
{
    /// Create a session with fresh handler state.
    pub fn new(id: u64, stream: S, dispatcher: Dispatcher<T, D>, size_mode: SizeMode) -> Self {
        Session {
            id,
            stream,
            codec: CommandCodec::with_size_mode(size_mode),
            dispatcher,
            summary: SessionSummary::default(),
        }
    }

    /// Session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handler state.
    pub fn dispatcher(&self) -> &Dispatcher<T, D> {
        &self.dispatcher
    }

    /// Serve the peer until it disconnects.
    ///
    /// Returns the summary on a normal disconnect, or the error that ended
    /// the session otherwise.
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        match self.serve() {
            Err(SessionError::PeerDisconnected) => {
                debug!(session = self.id, "peer disconnected");
                Ok(self.summary)
            }
            Err(SessionError::Desynchronized(error)) => {
                metrics::counter!(metric_defs::SESSIONS_DESYNCHRONIZED.name).increment(1);
                warn!(session = self.id, %error, "closing session: stream desynchronized");
                Err(SessionError::Desynchronized(error))
            }
            other => other.map(|_| self.summary),
        }
    }

    fn serve(&mut self) -> Result<(), SessionError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            self.drain()?;
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return Err(SessionError::PeerDisconnected),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(e)),
            };
            trace!(session = self.id, bytes = n, "read");
            self.summary.bytes_received += n as u64;
            metrics::counter!(metric_defs::BYTES_RECEIVED.name).increment(n as u64);
            self.codec.push(&buf[..n]);
        }
    }

    /// Execute every complete command in the buffer.
    fn drain(&mut self) -> Result<(), SessionError> {
        loop {
            match self.codec.decode() {
                Ok(Some(command)) => self.handle(command)?,
                Ok(None) => return Ok(()),
                Err(error) if error.is_desynchronizing() => {
                    return Err(SessionError::Desynchronized(error));
                }
                Err(error) => {
                    warn!(session = self.id, %error, "dropping malformed command");
                    self.summary.malformed_frames += 1;
                    metrics::counter!(metric_defs::MALFORMED_FRAMES.name).increment(1);
                    if let Some(reply) = Reply::filler(error.owed_reply()) {
                        self.write_reply(&reply)?;
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) -> Result<(), SessionError> {
        let name = command.opcode().name();
        let kind = command.reply_kind();
        self.summary.commands += 1;
        metrics::counter!(metric_defs::COMMANDS.name, "opcode" => name).increment(1);

        let started = Instant::now();
        let reply = match self.dispatcher.execute(command) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(session = self.id, opcode = name, %error, "command failed");
                self.summary.handler_errors += 1;
                metrics::counter!(metric_defs::COMMAND_ERRORS.name, "opcode" => name).increment(1);
                Reply::filler(kind)
            }
        };
        metrics::histogram!(metric_defs::COMMAND_DURATION.name, "opcode" => name)
            .record(started.elapsed().as_secs_f64());

        if let Some(reply) = reply {
            debug_assert_eq!(reply.encode().len(), kind.wire_len());
            self.write_reply(&reply)?;
        }
        Ok(())
    }

    fn write_reply(&mut self, reply: &Reply) -> Result<(), SessionError> {
        let bytes = reply.encode();
        self.stream.write_all(&bytes).map_err(map_io_error)?;
        self.stream.flush().map_err(map_io_error)?;
        self.summary.bytes_sent += bytes.len() as u64;
        metrics::counter!(metric_defs::BYTES_SENT.name).increment(bytes.len() as u64);
        Ok(())
    }
}

/// Resets and broken pipes are ordinary disconnects.
fn map_io_error(error: io::Error) -> SessionError {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => SessionError::PeerDisconnected,
        _ => SessionError::Io(error),
    }
}

/// Log the outcome of a finished session.
pub(crate) fn log_outcome(id: u64, outcome: &Result<SessionSummary, SessionError>) {
    match outcome {
        Ok(summary) => info!(
            session = id,
            commands = summary.commands,
            errors = summary.handler_errors,
            "session closed"
        ),
        Err(error) => warn!(session = id, %error, "session ended with error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LoopbackSpi;
    use crate::radio::SimRadio;
    use rrpi_protocol::{Address, RadioConfig, RadioPayload, TransferData};
    use std::io::Cursor;

    /// In-memory stream: reads from a fixed input, collects output.
    struct MemoryStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MemoryStream {
        fn new(input: Vec<u8>) -> Self {
            MemoryStream {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for MemoryStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // One byte at a time exercises partial frames
            let len = buf.len().min(1);
            self.input.read(&mut buf[..len])
        }
    }

    impl Write for MemoryStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session(input: Vec<u8>) -> Session<MemoryStream, LoopbackSpi, SimRadio> {
        Session::new(
            1,
            MemoryStream::new(input),
            Dispatcher::new(LoopbackSpi::new(), SimRadio::new()),
            SizeMode::LittleEndian,
        )
    }

    fn frames(commands: &[Command]) -> Vec<u8> {
        commands.iter().flat_map(|c| c.encode()).collect()
    }

    fn init() -> Command {
        Command::RadioInit(RadioConfig {
            spi_bus: 0,
            spi_device: 0,
            packet_size: 32,
            address: Address([0xE7; 5]),
            channel: 76,
        })
    }

    #[test]
    fn test_replies_in_order() {
        let input = frames(&[
            Command::SpiOpen { bus: 0, device: 0 },
            Command::SpiTransfer {
                data: TransferData::new(vec![0x10, 0x20]).unwrap(),
            },
            init(),
            Command::RadioPowerUp,
            Command::RadioSend {
                data: RadioPayload::new(vec![0xAA, 0xBB]).unwrap(),
            },
            Command::RadioReceive { count: 3 },
        ]);
        let mut s = session(input);
        let summary = s.run().unwrap();

        assert_eq!(summary.commands, 6);
        assert_eq!(summary.handler_errors, 0);
        assert_eq!(s.stream.output, vec![0x10, 0x20, 1, 0, 0, 0]);
    }

    #[test]
    fn test_failed_handler_sends_filler() {
        // Transfer before open, poll before init
        let input = frames(&[
            Command::SpiTransfer {
                data: TransferData::new(vec![1, 2, 3]).unwrap(),
            },
            Command::RadioPoll {
                timeout: rrpi_protocol::Timeout(0.0),
            },
            Command::SpiOpen { bus: 0, device: 0 },
            Command::SpiTransfer {
                data: TransferData::new(vec![9]).unwrap(),
            },
        ]);
        let mut s = session(input);
        let summary = s.run().unwrap();

        assert_eq!(summary.handler_errors, 2);
        assert_eq!(s.stream.output, vec![0, 0, 0, 0, 9]);
    }

    #[test]
    fn test_unknown_opcode_closes_session() {
        let mut input = frames(&[Command::SpiOpen { bus: 0, device: 0 }]);
        input.push(0xFF);
        input.extend(frames(&[Command::SpiTransfer {
            data: TransferData::new(vec![1]).unwrap(),
        }]));
        let mut s = session(input);

        assert!(matches!(s.run(), Err(SessionError::Desynchronized(_))));
        // Nothing after the bad byte was executed
        assert!(s.stream.output.is_empty());
        assert_eq!(s.dispatcher().bus().selected(), Some((0, 0)));
    }

    #[test]
    fn test_reserved_family_closes_session() {
        let mut s = session(vec![0x41]);
        assert!(matches!(s.run(), Err(SessionError::Desynchronized(_))));
    }

    #[test]
    fn test_invalid_init_fails_and_session_continues() {
        let mut input = vec![0xA1, 0, 0, 99, 1, 2, 3, 4, 5, 76];
        input.extend(frames(&[Command::SpiOpen { bus: 0, device: 0 }]));
        let mut s = session(input);
        let summary = s.run().unwrap();

        assert_eq!(summary.malformed_frames, 0);
        assert_eq!(summary.commands, 2);
        assert_eq!(summary.handler_errors, 1);
        assert!(s.stream.output.is_empty());
        assert_eq!(s.dispatcher().bus().selected(), Some((0, 0)));
    }

    #[test]
    fn test_oversized_legacy_transfer_gets_filler() {
        // (0x80 + 0x81) << 8 = 65792 bytes, above the transfer limit
        let mut input = vec![0x22, 0, 0, 0x23, 0x80, 0x81];
        input.resize(6 + 65792, 0x5A);
        input.extend_from_slice(&[0x23, 0x01, 0x00]);
        input.resize(input.len() + 256, 0x33);
        let mut s = Session::new(
            1,
            MemoryStream::new(input),
            Dispatcher::new(LoopbackSpi::new(), SimRadio::new()),
            SizeMode::Legacy,
        );
        let summary = s.run().unwrap();

        assert_eq!(summary.malformed_frames, 1);
        assert_eq!(summary.commands, 2);
        assert_eq!(s.stream.output.len(), 65792 + 256);
        assert!(s.stream.output[..65792].iter().all(|&b| b == 0));
        assert!(s.stream.output[65792..].iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_disconnect_mid_frame() {
        // Transfer announcing 4 bytes, only 2 present
        let mut s = session(vec![0x23, 4, 0, 1, 2]);
        let summary = s.run().unwrap();
        assert_eq!(summary.commands, 0);
        assert!(s.stream.output.is_empty());
    }
}
