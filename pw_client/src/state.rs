//! Request tri-state for UI bindings.
//!
//! A view renders from a [`RequestState`] instead of mutating shared state
//! before the server answers. `Pending` disables the action that started it.

use crate::errors::{ClientError, ClientResult};

/// Lifecycle of one user-triggered request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState<T> {
    Idle,
    Pending,
    Settled(T),
    Failed(ClientError),
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        RequestState::Idle
    }
}

impl<T> RequestState<T> {
    /// Mark the request as started.
    ///
    /// Fails with [`ClientError::RequestInFlight`] while a previous request
    /// has not resolved, so the action cannot be fired twice.
    pub fn begin(&mut self) -> ClientResult<()> {
        if self.is_pending() {
            return Err(ClientError::RequestInFlight);
        }
        *self = RequestState::Pending;
        Ok(())
    }

    /// Record the server's answer
    pub fn finish(&mut self, result: ClientResult<T>) {
        *self = match result {
            Ok(value) => RequestState::Settled(value),
            Err(err) => RequestState::Failed(err),
        };
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }

    pub fn settled(&self) -> Option<&T> {
        match self {
            RequestState::Settled(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            RequestState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// The action may be triggered (not pending)
    pub fn is_actionable(&self) -> bool {
        !self.is_pending()
    }
}
