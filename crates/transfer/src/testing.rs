//! Scripted transport and recording sleeper for tests.
//!
//! Compiled for this crate's own tests and, through the `test-util`
//! feature, for dependent crates' tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::TransferError;
use crate::client::{BoxFuture, Transport};
use crate::retry::Sleeper;
use crate::types::MultipartRequest;

/// Remote that replays a script of outcomes, then answers 200.
#[derive(Default)]
pub struct MockRemote {
    script: Mutex<VecDeque<Result<u16, TransferError>>>,
    sent: Mutex<Vec<MultipartRequest>>,
}

impl MockRemote {
    pub fn new(script: Vec<Result<u16, TransferError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every request received, retried attempts included.
    pub fn sent(&self) -> Vec<MultipartRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for MockRemote {
    fn send<'a>(
        &'a self,
        request: &'a MultipartRequest,
    ) -> BoxFuture<'a, Result<u16, TransferError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(request.clone());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(200))
        })
    }
}

/// Records requested delays and returns at once.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for &RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.slept.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

/// A connection failure as [`HttpTransport`](crate::HttpTransport) reports it.
pub fn refused() -> Result<u16, TransferError> {
    Err(TransferError::Connection("connection refused".into()))
}
