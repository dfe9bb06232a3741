/// Failures starting the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A frame could not be queued for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("send queue full")]
    Full,
    #[error("connection closed")]
    Closed,
}

impl SendError {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Closed => "closed",
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for SendError {
    fn from(err: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match err {
            tokio::sync::mpsc::error::TrySendError::Full(_) => Self::Full,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => Self::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:8000".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }

    #[test]
    fn try_send_errors_convert() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        tx.try_send(1).unwrap();
        assert_eq!(SendError::from(tx.try_send(2).unwrap_err()), SendError::Full);
        drop(rx);
        assert_eq!(SendError::from(tx.try_send(3).unwrap_err()), SendError::Closed);
        assert_eq!(SendError::Full.as_str(), "full");
    }
}
