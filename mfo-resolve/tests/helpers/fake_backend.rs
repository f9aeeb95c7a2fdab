//! In-memory backend channel

use async_trait::async_trait;
use futures::stream;
use mfo_resolve::models::{BackendMessage, ResolveRequest};
use mfo_resolve::services::{BackendChannel, ByteStream};
use mfo_resolve::{ResolveError, ResolveResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeBackend {
    /// Chunks returned by `open`, in order
    script: Mutex<Vec<Vec<u8>>>,
    pub opened: Mutex<Vec<ResolveRequest>>,
    pub inputs: Mutex<Vec<String>>,
    pub fail_open: AtomicBool,
    pub fail_input: AtomicBool,
    pub terminate_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose stream replays `messages`, one chunk per message
    pub fn scripted(messages: &[BackendMessage]) -> Self {
        let chunks = messages
            .iter()
            .map(|m| {
                let mut line = serde_json::to_vec(m).unwrap();
                line.push(b'\n');
                line
            })
            .collect();
        Self {
            script: Mutex::new(chunks),
            ..Default::default()
        }
    }

    pub fn failing_open() -> Self {
        let backend = Self::default();
        backend.fail_open.store(true, Ordering::SeqCst);
        backend
    }

    pub fn set_fail_input(&self, fail: bool) {
        self.fail_input.store(fail, Ordering::SeqCst);
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn terminate_count(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendChannel for FakeBackend {
    async fn open(&self, request: &ResolveRequest) -> ResolveResult<ByteStream> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ResolveError::Backend("connection refused".to_string()));
        }
        self.opened.lock().unwrap().push(request.clone());

        let chunks: Vec<ResolveResult<Vec<u8>>> = std::mem::take(&mut *self.script.lock().unwrap())
            .into_iter()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn send_input(&self, input: &str) -> ResolveResult<()> {
        if self.fail_input.load(Ordering::SeqCst) {
            return Err(ResolveError::Backend("process not running".to_string()));
        }
        self.inputs.lock().unwrap().push(input.to_string());
        Ok(())
    }

    async fn terminate(&self) -> ResolveResult<()> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
