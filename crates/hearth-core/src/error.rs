use thiserror::Error;

use hearth_shared::{Denial, DenialKind};

use crate::store::PersistenceError;

/// Failure of an engine command.  A [`Denial`] is an expected outcome the
/// caller can show to the user; a persistence failure is not.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Denied: {0}")]
    Denied(#[from] Denial),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl CoreError {
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            CoreError::Denied(denial) => Some(denial),
            CoreError::Persistence(_) => None,
        }
    }

    /// Category of the denial, `None` for persistence failures.
    pub fn kind(&self) -> Option<DenialKind> {
        self.denial().map(Denial::kind)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_keeps_its_category() {
        let err = CoreError::from(Denial::NotOwner);
        assert_eq!(err.kind(), Some(DenialKind::Unauthorized));
        assert_eq!(err.denial(), Some(&Denial::NotOwner));
    }

    #[test]
    fn persistence_failures_have_no_category() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = CoreError::from(PersistenceError::new(io));
        assert!(err.kind().is_none());
        assert!(err.to_string().contains("disk gone"));
    }
}
