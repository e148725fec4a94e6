//! Scripted turn executors for pattern and DAG tests.

use async_trait::async_trait;
use maestro_agent::events::CliEvent;
use maestro_agent::turn::{TurnRequest, TurnResult};
use maestro_core::MaestroError;
use parking_lot::Mutex;

use crate::executor::TurnExecutor;

/// Function deciding each scripted turn: `(agent_name, input) -> text`.
pub type TurnScript =
    Box<dyn Fn(&str, &str) -> Result<String, MaestroError> + Send + Sync + 'static>;

/// A [`TurnExecutor`] that answers from a closure and records every call.
pub struct ScriptedExecutor {
    script: TurnScript,
    /// Recorded `(agent_name, input)` pairs in call order.
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    /// Executor answering with `script`.
    pub fn new(
        script: impl Fn(&str, &str) -> Result<String, MaestroError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Executor echoing a fixed reply per agent name via the given table.
    pub fn table(entries: &[(&str, &str)]) -> Self {
        let table: Vec<(String, String)> = entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Self::new(move |agent, _input| {
            table
                .iter()
                .find(|(name, _)| name == agent)
                .map(|(_, reply)| reply.clone())
                .ok_or_else(|| MaestroError::Internal(format!("no script for agent {agent}")))
        })
    }

    /// Inputs recorded for one agent.
    pub fn inputs_for(&self, agent: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == agent)
            .map(|(_, input)| input.clone())
            .collect()
    }

    /// Agent names in call order.
    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

#[async_trait]
impl TurnExecutor for ScriptedExecutor {
    async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError> {
        self.calls
            .lock()
            .push((req.agent.name.clone(), req.input.clone()));
        let text = (self.script)(&req.agent.name, &req.input)?;
        if let Some(tx) = &req.events {
            let _ = tx.send(CliEvent::Text { text: text.clone() });
        }
        Ok(TurnResult {
            text,
            tokens: 10,
            cost_usd: 0.001,
            elapsed_ms: 1,
            ..Default::default()
        })
    }
}
