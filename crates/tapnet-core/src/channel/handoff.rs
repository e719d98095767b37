//! Session ownership handoff
//!
//! Moves an open session from the task that connected it to the task that
//! reads the response and closes it. The producer gives up the value on
//! `handoff`; the consumer owns it exclusively after `take`.

use crate::config::SessionConfig;
use core::fmt;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Why a handoff was refused; the token comes back so the caller can release it
pub enum HandoffError<T> {
    Full(T),
    Closed(T),
}

impl<T> HandoffError<T> {
    pub fn into_token(self) -> T {
        match self {
            HandoffError::Full(token) | HandoffError::Closed(token) => token,
        }
    }
}

impl<T> fmt::Debug for HandoffError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffError::Full(_) => write!(f, "HandoffError::Full(..)"),
            HandoffError::Closed(_) => write!(f, "HandoffError::Closed(..)"),
        }
    }
}

impl<T> fmt::Display for HandoffError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffError::Full(_) => write!(f, "Session queue is full"),
            HandoffError::Closed(_) => write!(f, "Session consumer is gone"),
        }
    }
}

impl<T> std::error::Error for HandoffError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    Timeout,
    Closed,
}

impl fmt::Display for TakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeError::Timeout => write!(f, "No session handed off before the timeout"),
            TakeError::Closed => write!(f, "All session producers are gone"),
        }
    }
}

impl std::error::Error for TakeError {}

// ----------------------------------------------------------------------------
// Producer / Consumer Ends
// ----------------------------------------------------------------------------

/// Producer end, cloneable for multiple connecting tasks
pub struct SessionHandoff<T> {
    sender: mpsc::Sender<T>,
}

impl<T> Clone for SessionHandoff<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> SessionHandoff<T> {
    /// Enqueue a token without waiting
    pub fn handoff(&self, token: T) -> Result<(), HandoffError<T>> {
        self.sender.try_send(token).map_err(|e| match e {
            mpsc::error::TrySendError::Full(token) => HandoffError::Full(token),
            mpsc::error::TrySendError::Closed(token) => HandoffError::Closed(token),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer end; exactly one task holds it
pub struct SessionTaker<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> SessionTaker<T> {
    /// Wait for the next token in FIFO order
    ///
    /// `None` waits indefinitely.
    pub async fn take(&mut self, timeout: Option<Duration>) -> Result<T, TakeError> {
        match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.receiver.recv()).await {
                Ok(Some(token)) => Ok(token),
                Ok(None) => Err(TakeError::Closed),
                Err(_) => Err(TakeError::Timeout),
            },
            None => self.receiver.recv().await.ok_or(TakeError::Closed),
        }
    }

    /// Take a token only if one is already queued
    pub fn try_take(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Create a bounded session queue
pub fn session_queue<T>(capacity: usize) -> (SessionHandoff<T>, SessionTaker<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (SessionHandoff { sender }, SessionTaker { receiver })
}

/// Create the session queue sized by the session configuration
pub fn create_session_queue<T>(config: &SessionConfig) -> (SessionHandoff<T>, SessionTaker<T>) {
    session_queue(config.handoff_capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_take_blocks_until_handoff() {
        let (handoff, mut taker) = session_queue::<Arc<u32>>(1);
        let token = Arc::new(7);

        let mut take = task::spawn(taker.take(None));
        assert_pending!(take.poll());

        handoff.handoff(token.clone()).unwrap();
        assert!(take.is_woken());

        let received = assert_ready!(take.poll()).unwrap();
        assert!(Arc::ptr_eq(&received, &token));
    }

    #[tokio::test]
    async fn test_full_queue_returns_token() {
        let (handoff, _taker) = session_queue::<u32>(1);
        handoff.handoff(1).unwrap();

        let err = handoff.handoff(2).unwrap_err();
        assert!(matches!(err, HandoffError::Full(_)));
        assert_eq!(err.into_token(), 2);
    }

    #[tokio::test]
    async fn test_fifo_order_with_capacity() {
        let (handoff, mut taker) = session_queue::<u32>(3);
        for token in 1..=3 {
            handoff.handoff(token).unwrap();
        }
        for expected in 1..=3 {
            assert_eq!(taker.take(None).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_take_timeout() {
        let (_handoff, mut taker) = session_queue::<u32>(1);
        let result = taker.take(Some(Duration::from_millis(10))).await;
        assert_eq!(result.unwrap_err(), TakeError::Timeout);
    }

    #[tokio::test]
    async fn test_closed_consumer_returns_token() {
        let (handoff, taker) = session_queue::<u32>(1);
        drop(taker);
        let err = handoff.handoff(5).unwrap_err();
        assert!(matches!(err, HandoffError::Closed(5)));
    }
}
