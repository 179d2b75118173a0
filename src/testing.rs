// Test doubles for the collaborators the session layer talks to

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::http_client::{OutgoingRequest, Transport, TransportResponse};

/// Transport that replays scripted responses per path, in order,
/// and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Result<TransportResponse>>)>>,
    guarded: Mutex<Vec<(String, String, Value)>>,
    pub requests: Mutex<Vec<OutgoingRequest>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn on(&self, path: &str, response: Result<TransportResponse>) -> &Self {
        let mut routes = self.routes.lock();
        match routes.iter_mut().find(|(p, _)| p == path) {
            Some((_, queue)) => queue.push_back(response),
            None => routes.push((path.to_string(), VecDeque::from([response]))),
        }
        self
    }

    /// Answer `path` with 200 and `body` only when it bears `token`, 401 otherwise
    pub fn guard(&self, path: &str, token: &str, body: Value) -> &Self {
        self.guarded
            .lock()
            .push((path.to_string(), token.to_string(), body));
        self
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutgoingRequest) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let gate = self
            .guarded
            .lock()
            .iter()
            .find(|(p, _, _)| *p == request.path)
            .map(|(_, token, body)| (token.clone(), body.clone()));
        if let Some((token, body)) = gate {
            return Ok(if request.bearer() == Some(token.as_str()) {
                TransportResponse::new(200, body)
            } else {
                TransportResponse::new(401, serde_json::json!({"error": "Token has expired"}))
            });
        }

        let next = {
            let mut routes = self.routes.lock();
            routes
                .iter_mut()
                .find(|(p, _)| *p == request.path)
                .and_then(|(_, queue)| {
                    // The last scripted response repeats
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
        };

        next.unwrap_or_else(|| {
            Err(SessionError::Transport(format!(
                "no scripted response for {}",
                request.path
            )))
        })
    }
}
