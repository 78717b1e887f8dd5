use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Auth { status: u16 },
    Status(u16),
    Envelope { code: String, key: String, value: String },
    Protocol(String),
    UnknownDevice { smarthome_id: String, device_id: String },
    Io(std::io::Error),
}

impl Error {
    /// True for answers the API gave us but refused (non-200 or a
    /// non-success envelope). These get one retry after a forced re-login.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Status(_) | Error::Envelope { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Auth { status } => write!(f, "authentication rejected (HTTP {status})"),
            Error::Status(status) => write!(f, "unexpected HTTP status {status}"),
            Error::Envelope { code, key, value } => {
                write!(f, "API error: code {code}, key {key}, value {value}")
            }
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::UnknownDevice {
                smarthome_id,
                device_id,
            } => write!(f, "unknown device {device_id} in smart home {smarthome_id}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
