#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use genqueue_core::{GenerationRequest, JobId, JobStatus, StoreEvent};
use genqueue_engine::{
    ErrorEnvelope, OperationHandle, Orchestrator, PollResponse, RemoteError,
    RemoteOperationClient,
};
use tokio::sync::Notify;

pub const TEST_KEY: &str = "test-key";

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(genqueue_logging::initialize_for_tests);
}

struct OutputScript {
    submit_error: Option<RemoteError>,
    polls: VecDeque<Result<PollResponse, RemoteError>>,
    fetch: Result<Vec<u8>, RemoteError>,
    gate: Option<Arc<Notify>>,
    fetch_gate: Option<Arc<Notify>>,
}

/// In-memory remote service. Each output is scripted by `(prompt, index)`.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, OutputScript>>,
    calls: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    fetch_signal: Notify,
}

pub fn handle_for(prompt: &str, index: usize) -> String {
    format!("{prompt}#{index}")
}

pub fn reference_for(prompt: &str, index: usize) -> String {
    format!("{prompt}#{index}/video")
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set(&self, prompt: &str, index: usize, script: OutputScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(handle_for(prompt, index), script);
    }

    /// Polls report each of `progress` while running, then done; fetch
    /// returns `bytes`.
    pub fn succeed(&self, prompt: &str, index: usize, progress: &[f64], bytes: &[u8]) {
        let mut polls: VecDeque<_> = progress
            .iter()
            .map(|p| Ok(PollResponse::running(Some(*p))))
            .collect();
        polls.push_back(Ok(PollResponse::finished(reference_for(prompt, index))));
        self.set(
            prompt,
            index,
            OutputScript {
                submit_error: None,
                polls,
                fetch: Ok(bytes.to_vec()),
                gate: None,
                fetch_gate: None,
            },
        );
    }

    pub fn fail_submit(&self, prompt: &str, index: usize, err: RemoteError) {
        self.set(
            prompt,
            index,
            OutputScript {
                submit_error: Some(err),
                polls: VecDeque::new(),
                fetch: Ok(Vec::new()),
                gate: None,
                fetch_gate: None,
            },
        );
    }

    pub fn fail_poll(&self, prompt: &str, index: usize, err: RemoteError) {
        self.set(
            prompt,
            index,
            OutputScript {
                submit_error: None,
                polls: VecDeque::from([Err(err)]),
                fetch: Ok(Vec::new()),
                gate: None,
                fetch_gate: None,
            },
        );
    }

    pub fn fail_remote(&self, prompt: &str, index: usize, envelope: ErrorEnvelope) {
        self.set(
            prompt,
            index,
            OutputScript {
                submit_error: None,
                polls: VecDeque::from([Ok(PollResponse::failed(envelope))]),
                fetch: Ok(Vec::new()),
                gate: None,
                fetch_gate: None,
            },
        );
    }

    pub fn finish_without_result(&self, prompt: &str, index: usize) {
        self.set(
            prompt,
            index,
            OutputScript {
                submit_error: None,
                polls: VecDeque::from([Ok(PollResponse {
                    done: true,
                    ..PollResponse::default()
                })]),
                fetch: Ok(Vec::new()),
                gate: None,
                fetch_gate: None,
            },
        );
    }

    pub fn fail_fetch(&self, prompt: &str, index: usize, err: RemoteError) {
        self.succeed(prompt, index, &[], b"");
        if let Some(script) = self.scripts.lock().unwrap().get_mut(&handle_for(prompt, index)) {
            script.fetch = Err(err);
        }
    }

    /// Holds the final poll response of an output until the gate is
    /// notified.
    pub fn gate(&self, prompt: &str, index: usize) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        if let Some(script) = self.scripts.lock().unwrap().get_mut(&handle_for(prompt, index)) {
            script.gate = Some(gate.clone());
        }
        gate
    }

    /// Holds the download of an output until the gate is notified.
    pub fn gate_fetch(&self, prompt: &str, index: usize) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        if let Some(script) = self.scripts.lock().unwrap().get_mut(&handle_for(prompt, index)) {
            script.fetch_gate = Some(gate.clone());
        }
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// References in the order their fetch completed.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub async fn wait_for_fetch(&self, reference: &str) {
        loop {
            let signal = self.fetch_signal.notified();
            if self.fetched().iter().any(|r| r == reference) {
                return;
            }
            signal.await;
        }
    }
}

#[async_trait::async_trait]
impl RemoteOperationClient for ScriptedClient {
    async fn submit(
        &self,
        request: &GenerationRequest,
        output_index: usize,
    ) -> Result<OperationHandle, RemoteError> {
        let handle = handle_for(&request.prompt, output_index);
        self.calls.lock().unwrap().push(format!("submit:{handle}"));
        let scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get(&handle)
            .ok_or_else(|| RemoteError::Transport(format!("unscripted {handle}")))?;
        match &script.submit_error {
            Some(err) => Err(err.clone()),
            None => Ok(OperationHandle(handle)),
        }
    }

    async fn poll(&self, handle: &OperationHandle) -> Result<PollResponse, RemoteError> {
        self.calls.lock().unwrap().push(format!("poll:{handle}"));
        let (response, gate) = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts
                .get_mut(handle.as_str())
                .ok_or_else(|| RemoteError::Transport(format!("unscripted {handle}")))?;
            if script.polls.len() > 1 {
                (script.polls.pop_front(), None)
            } else {
                (script.polls.front().cloned(), script.gate.clone())
            }
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        response.unwrap_or_else(|| Err(RemoteError::Transport("no poll scripted".to_string())))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, RemoteError> {
        self.calls.lock().unwrap().push(format!("fetch:{reference}"));
        let handle = reference.trim_end_matches("/video");
        let (result, gate) = {
            let scripts = self.scripts.lock().unwrap();
            match scripts.get(handle) {
                Some(script) => (script.fetch.clone(), script.fetch_gate.clone()),
                None => (Err(RemoteError::NotFound(reference.to_string())), None),
            }
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.fetched.lock().unwrap().push(reference.to_string());
        self.fetch_signal.notify_waiters();
        result
    }
}

/// Tracks the set of GENERATING jobs from store events and remembers the
/// largest size it reached and the promotion order.
#[derive(Default)]
pub struct AdmissionLog {
    generating: HashSet<JobId>,
    pub max_generating: usize,
    pub promotions: Vec<JobId>,
}

pub fn track_admissions(orchestrator: &Orchestrator) -> Arc<Mutex<AdmissionLog>> {
    let log = Arc::new(Mutex::new(AdmissionLog::default()));
    let sink = log.clone();
    orchestrator.subscribe(move |event| {
        let mut log = sink.lock().unwrap();
        match event {
            StoreEvent::Updated { id, status } => match status {
                JobStatus::Generating => {
                    if log.generating.insert(*id) {
                        log.promotions.push(*id);
                    }
                    log.max_generating = log.max_generating.max(log.generating.len());
                }
                JobStatus::Completed | JobStatus::Failed => {
                    log.generating.remove(id);
                }
                _ => {}
            },
            StoreEvent::Removed { id } => {
                log.generating.remove(id);
            }
            _ => {}
        }
    });
    log
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
