use super::FrequencyBackend;
use crate::error::RigError;
use iqpan_messages::Kilohertz;
use log::{debug, info};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for Hamlib's `rigctld` network daemon.
///
/// Uses the plain text protocol: `f` asks for the VFO frequency, answered
/// with a line in Hz, or `RPRT <code>` on error. `F <hz>` sets it and is
/// answered with `RPRT 0` on success. The connection is made on the first
/// request and dropped after any failure, to be retried on the next.
#[derive(Debug)]
pub struct RigctldBackend {
    endpoint: String,
    conn: Option<BufReader<TcpStream>>,
}

impl RigctldBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            conn: None,
        }
    }

    fn connect(&self) -> Result<BufReader<TcpStream>, RigError> {
        let mut last_err = None;
        for addr in self.endpoint.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(IO_TIMEOUT))?;
                    stream.set_write_timeout(Some(IO_TIMEOUT))?;
                    stream.set_nodelay(true)?;
                    info!("Connected to rigctld at {}", addr);
                    return Ok(BufReader::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => RigError::Io(e),
            None => RigError::NotFound(format!("{} did not resolve", self.endpoint)),
        })
    }

    /// Send one command line and return the reply line.
    fn request(conn: &mut BufReader<TcpStream>, command: &str) -> Result<String, RigError> {
        conn.get_mut().write_all(command.as_bytes())?;
        let mut line = String::new();
        if conn.read_line(&mut line)? == 0 {
            return Err(RigError::Protocol(String::from("connection closed")));
        }
        Ok(line)
    }

    /// Run `exchange` over the cached connection, connecting first if needed.
    fn with_connection<T>(
        &mut self,
        exchange: impl FnOnce(&mut BufReader<TcpStream>) -> Result<T, RigError>,
    ) -> Result<T, RigError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let result = exchange(&mut conn);
        match &result {
            Ok(_) => self.conn = Some(conn),
            Err(e) => debug!("Dropping rigctld connection after error: {}", e),
        }
        result
    }
}

/// Parse one reply line of the `f` command.
pub(crate) fn parse_frequency_reply(line: &str) -> Result<Kilohertz, RigError> {
    let line = line.trim();
    if let Some(code) = line.strip_prefix("RPRT") {
        return Err(match code.trim().parse::<i32>() {
            Ok(code) => RigError::Report(code),
            Err(_) => RigError::Protocol(line.to_string()),
        });
    }
    match line.parse::<f64>() {
        Ok(hz) if hz.is_finite() && hz > 0.0 => Ok(Kilohertz::from_hz(hz)),
        _ => Err(RigError::Protocol(line.to_string())),
    }
}

/// Parse the reply of a set command; only `RPRT 0` is success.
pub(crate) fn parse_report_reply(line: &str) -> Result<(), RigError> {
    let line = line.trim();
    match line.strip_prefix("RPRT").map(|code| code.trim().parse::<i32>()) {
        Some(Ok(0)) => Ok(()),
        Some(Ok(code)) => Err(RigError::Report(code)),
        _ => Err(RigError::Protocol(line.to_string())),
    }
}

impl FrequencyBackend for RigctldBackend {
    fn poll(&mut self) -> Result<Kilohertz, RigError> {
        self.with_connection(|conn| parse_frequency_reply(&Self::request(conn, "f\n")?))
    }

    fn set_frequency(&mut self, frequency: Kilohertz) -> Result<(), RigError> {
        if !(frequency.0.is_finite() && frequency.0 > 0.0) {
            return Err(RigError::Protocol(format!("cannot tune to {frequency}")));
        }
        let command = format!("F {:.0}\n", frequency.0 * 1000.0);
        self.with_connection(|conn| parse_report_reply(&Self::request(conn, &command)?))
    }

    fn describe(&self) -> String {
        format!("rigctld at {}", self.endpoint)
    }
}
