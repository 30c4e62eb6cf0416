use keyhole_core::StorageError;
use keyhole_keygen::KeyError;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Debug, Error)]
pub(crate) enum KeygenError {
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl From<KeygenError> for Status {
    fn from(err: KeygenError) -> Self {
        let KeygenError::Key(err) = err;
        let code = match &err {
            KeyError::Cancelled => Code::Cancelled,
            KeyError::DeadlineExceeded(_) => Code::DeadlineExceeded,
            KeyError::Storage(StorageError::Unavailable(_) | StorageError::Timeout(_)) => {
                Code::Unavailable
            }
            _ => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}
