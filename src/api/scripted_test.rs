//! Scripted profile API for session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use async_trait::async_trait;

use super::{ApiError, ProfileApi, User};
use crate::role::Role;

pub fn user(id: &str, role: Role) -> User {
    User {
        id: id.to_owned(),
        role,
        email: format!("{id}@example.com"),
        profile: serde_json::json!({ "name": format!("User {id}") }),
    }
}

/// Profile API that replays scripted results in order.
///
/// When built with a gate, each call parks until the gate is notified,
/// which lets tests observe the in-flight state.
#[derive(Default)]
pub struct ScriptedProfileApi {
    responses: Mutex<VecDeque<Result<User, ApiError>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedProfileApi {
    pub fn new(responses: Vec<Result<User, ApiError>>) -> Self {
        Self { responses: Mutex::new(responses.into()), ..Self::default() }
    }

    pub fn gated(responses: Vec<Result<User, ApiError>>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let api = Self { responses: Mutex::new(responses.into()), gate: Some(gate.clone()), ..Self::default() };
        (api, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileApi for ScriptedProfileApi {
    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_owned());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("no scripted response".into())))
    }
}
