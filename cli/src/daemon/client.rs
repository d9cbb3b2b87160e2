use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use voltlink_protocol::{
    DaemonRequest, DaemonResponse, DaemonStatus, ReadingPayload, ReconfigureResult, StatsSnapshot,
    MIN_SUPPORTED_VERSION, PROTOCOL_VERSION,
};

use crate::daemon::socket_path;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("daemon needs protocol v{required}+ but voltlink speaks v{client}, upgrade voltlink")]
    ClientTooOld { client: u32, required: u32 },

    #[error("daemon speaks protocol v{daemon} but voltlink needs v{required}+, restart the daemon")]
    DaemonTooOld { daemon: u32, required: u32 },
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub fn check_version_compatibility(status: &DaemonStatus) -> Result<()> {
    if PROTOCOL_VERSION < status.min_supported_version {
        return Err(ClientError::ClientTooOld {
            client: PROTOCOL_VERSION,
            required: status.min_supported_version,
        });
    }
    if status.protocol_version < MIN_SUPPORTED_VERSION {
        return Err(ClientError::DaemonTooOld {
            daemon: status.protocol_version,
            required: MIN_SUPPORTED_VERSION,
        });
    }
    Ok(())
}

/// Blocking connection to the daemon socket.
pub struct DaemonClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl DaemonClient {
    pub fn connect() -> Result<Self> {
        Self::from_stream(UnixStream::connect(socket_path())?)
    }

    fn from_stream(stream: UnixStream) -> Result<Self> {
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(Self {
            writer: stream.try_clone()?,
            reader: BufReader::new(stream),
        })
    }

    pub fn connect_with_version_check() -> Result<Self> {
        let mut client = Self::connect()?;
        let status = client.get_status()?;
        check_version_compatibility(&status)?;
        Ok(client)
    }

    fn read_response(&mut self) -> Result<DaemonResponse> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(ClientError::Protocol("Connection closed".into()));
        }
        tracing::trace!(line_len = line.len(), "read response");
        DaemonResponse::from_json(&line).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn send_request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        let json = request
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;

        // A subscribed connection can have updates queued ahead of the reply.
        loop {
            match self.read_response()? {
                DaemonResponse::StatsUpdate(_) => continue,
                response => return Ok(response),
            }
        }
    }

    pub fn get_status(&mut self) -> Result<DaemonStatus> {
        match self.send_request(DaemonRequest::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_stats(&mut self) -> Result<StatsSnapshot> {
        match self.send_request(DaemonRequest::GetStats)? {
            DaemonResponse::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    pub fn reconfigure(&mut self) -> Result<ReconfigureResult> {
        match self.send_request(DaemonRequest::Reconfigure)? {
            DaemonResponse::Reconfigured(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub fn push_reading(&mut self, reading: ReadingPayload) -> Result<()> {
        match self.send_request(DaemonRequest::PushReading(reading))? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self.send_request(DaemonRequest::Shutdown)? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn subscribe(&mut self) -> Result<()> {
        match self.send_request(DaemonRequest::Subscribe)? {
            DaemonResponse::Subscribed => Ok(()),
            DaemonResponse::SubscriptionRejected { reason } => {
                Err(ClientError::SubscriptionRejected(reason))
            }
            other => Err(unexpected(other)),
        }
    }

    /// Blocks until the next pushed stats update. Call after [`subscribe`].
    ///
    /// [`subscribe`]: Self::subscribe
    pub fn next_update(&mut self) -> Result<StatsSnapshot> {
        loop {
            match self.read_response()? {
                DaemonResponse::StatsUpdate(stats) => return Ok(stats),
                DaemonResponse::Error(e) => return Err(ClientError::Daemon(e)),
                other => tracing::debug!(response = ?other, "Ignoring non-update response"),
            }
        }
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }
}

fn unexpected(response: DaemonResponse) -> ClientError {
    match response {
        DaemonResponse::Error(e) => ClientError::Daemon(e),
        _ => ClientError::Protocol("Unexpected response".into()),
    }
}
