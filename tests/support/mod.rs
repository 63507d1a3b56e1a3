//! Shared fixtures for integration tests: a scripted transport and seeding helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use skill_registry::core::dispatch::{OutboundMessage, SendReceipt, Transport, TransportError};
use skill_registry::core::{NewSkill, RegistryStore, StudentPatch};
use skill_registry::infra::InMemoryStore;

/// Transport that replays scripted failures, then succeeds, and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(Instant, OutboundMessage)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport failing with each message in turn before succeeding.
    pub fn failing(errors: &[&str]) -> Arc<Self> {
        let transport = Self::default();
        transport
            .script
            .lock()
            .extend(errors.iter().map(|e| (*e).to_string()));
        Arc::new(transport)
    }

    pub fn calls(&self) -> Vec<(Instant, OutboundMessage)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, m)| m.to.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push((Instant::now(), message.clone()));
            calls.len()
        };
        if let Some(err) = self.script.lock().pop_front() {
            return Err(TransportError::new(err));
        }
        Ok(SendReceipt {
            message_id: format!("<{n}@test>"),
            response: Some("250 OK".into()),
        })
    }
}

pub fn skill(code: &str, description: &str, max_selection: u32) -> NewSkill {
    NewSkill {
        code: code.into(),
        description: description.into(),
        trainer: Some(format!("Trainer {code}")),
        phone: Some("08000000000".into()),
        max_selection,
        hidden: false,
    }
}

pub async fn seed_skill(store: &InMemoryStore, code: &str, max_selection: u32) {
    store
        .upsert_resource(skill(code, &format!("{code} training"), max_selection))
        .await
        .unwrap();
}

pub async fn seed_student(store: &InMemoryStore, matric: &str, email: Option<&str>) {
    store
        .upsert_holder(
            matric,
            StudentPatch {
                name: Some(format!("Student {matric}")),
                email: email.map(ToString::to_string),
                ..StudentPatch::default()
            },
        )
        .await
        .unwrap();
}

pub async fn selected_count(store: &InMemoryStore, code: &str) -> u32 {
    store.find_resource(code).await.unwrap().unwrap().selected_count
}
