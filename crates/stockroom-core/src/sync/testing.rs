//! In-memory transport and notifier for engine tests

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::client::SyncTransport;
use super::notify::{SyncNotifier, SyncSummary};
use super::protocol::{PullResponse, PushRequest, PushResponse};
use crate::error::{Error, Result};
use crate::models::FieldMap;

type PushHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[derive(Default)]
struct FakeState {
    push_response: Option<PushResponse>,
    pull_response: PullResponse,
    push_error: Option<Error>,
    pull_error: Option<Error>,
    pushed: Vec<PushRequest>,
    pull_checkpoints: Vec<Option<String>>,
    push_hook: Option<PushHook>,
}

/// Scripted server. Without a scripted response a push accepts everything
/// and a pull returns no updates.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn set_push_response(&self, response: PushResponse) {
        self.state.lock().unwrap().push_response = Some(response);
    }

    pub fn set_pull_response(&self, response: PullResponse) {
        self.state.lock().unwrap().pull_response = response;
    }

    pub fn fail_next_push(&self, error: Error) {
        self.state.lock().unwrap().push_error = Some(error);
    }

    pub fn fail_next_pull(&self, error: Error) {
        self.state.lock().unwrap().pull_error = Some(error);
    }

    /// Run `hook` while a push request is in flight
    pub fn on_push<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: PushHook =
            Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(hook()) });
        self.state.lock().unwrap().push_hook = Some(boxed);
    }

    pub fn push_calls(&self) -> usize {
        self.state.lock().unwrap().pushed.len()
    }

    pub fn pushed_requests(&self) -> Vec<PushRequest> {
        self.state.lock().unwrap().pushed.clone()
    }

    pub fn pull_checkpoints(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().pull_checkpoints.clone()
    }
}

#[async_trait]
impl SyncTransport for FakeTransport {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        let hook = {
            let mut state = self.state.lock().unwrap();
            state.pushed.push(request.clone());
            state.push_hook.clone()
        };
        if let Some(hook) = hook {
            hook().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.push_error.take() {
            return Err(error);
        }
        Ok(state.push_response.clone().unwrap_or_else(|| PushResponse {
            processed: request.record_count(),
            conflicts: Vec::new(),
        }))
    }

    async fn pull(&self, since: Option<&str>) -> Result<PullResponse> {
        let mut state = self.state.lock().unwrap();
        state.pull_checkpoints.push(since.map(str::to_string));
        if let Some(error) = state.pull_error.take() {
            return Err(error);
        }
        Ok(state.pull_response.clone())
    }
}

/// Collects every summary it receives
#[derive(Default)]
pub struct RecordingNotifier {
    summaries: Mutex<Vec<SyncSummary>>,
}

impl RecordingNotifier {
    pub fn summaries(&self) -> Vec<SyncSummary> {
        self.summaries.lock().unwrap().clone()
    }
}

impl SyncNotifier for RecordingNotifier {
    fn notify(&self, summary: &SyncSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}
