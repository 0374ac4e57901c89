// src/agents/job.rs
//! Driver-facing handle: an agent plus the engine and arguments it runs with

use crate::agents::agent::{Agent, Completion};
use crate::engine::Engine;
use crate::utils::errors::{Result, ToolboxError};
use tracing::error;

/// One migration run.
///
/// The engine is borrowed for the job's lifetime; the agent is owned.
pub struct MigrationJob<'e, E: Engine> {
    agent: Box<dyn Agent<E>>,
    engine: Option<&'e mut E>,
    args: Vec<String>,
}

impl<'e, E: Engine> MigrationJob<'e, E> {
    pub fn new(agent: Box<dyn Agent<E>>) -> Self {
        Self {
            agent,
            engine: None,
            args: Vec::new(),
        }
    }

    pub fn assign_engine(&mut self, engine: &'e mut E) -> &mut Self {
        self.engine = Some(engine);
        self
    }

    /// Command-line style arguments handed to the agent at initialization
    pub fn assign_args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn agent(&self) -> &dyn Agent<E> {
        self.agent.as_ref()
    }

    /// Run the agent's lifecycle against the assigned engine
    pub fn execute(&mut self) -> Result<Completion> {
        let engine = match self.engine.as_deref_mut() {
            Some(engine) => engine,
            None => {
                error!("No engine assigned to the {} agent", self.agent.kind());
                return Err(ToolboxError::EngineUnset);
            }
        };

        self.agent.execute(engine, &self.args)
    }
}
