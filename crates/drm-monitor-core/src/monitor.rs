//! The event dispatch loop.
//!
//! `Monitor` owns everything the loop touches: the sequence source, the
//! state table, the renderer and the rearm policy. Processing is strictly
//! serialized: each completion is applied, rendered and rearmed before the
//! next wait begins.

use std::convert::Infallible;
use std::io::Write;

use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::rearm::{RearmOutcome, RearmPolicy};
use crate::renderer::TerminalRenderer;
use crate::source::{Completion, CompletionToken, SequenceSource};
use crate::state::StateTable;

/// Dispatch loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on the source (or between events).
    Idle,
    /// Handling the completion for this token.
    Delivering(CompletionToken),
}

pub struct Monitor<S, W: Write> {
    source: S,
    table: StateTable,
    renderer: TerminalRenderer<W>,
    rearm: RearmPolicy,
    state: LoopState,
}

impl<S: SequenceSource, W: Write> Monitor<S, W> {
    /// Discovers CRTCs, seeds the table, arms every CRTC once and draws the
    /// initial view.
    ///
    /// # Errors
    /// Any fatal startup condition: enumeration failure, too many CRTCs, a
    /// query or request failure other than "disabled", or a write failure.
    pub fn start(mut source: S, config: &MonitorConfig, out: W) -> Result<Self, MonitorError> {
        let ids = source
            .enumerate_crtcs()
            .map_err(|err| MonitorError::from_source("enumerate CRTCs", None, err))?;
        info!(count = ids.len(), "discovered CRTCs");

        let table = StateTable::initialize(&mut source, &ids)?;
        let rearm = RearmPolicy::new(config.on_disabled);
        for index in 0..table.len() {
            let outcome = rearm.prime(&mut source, &table, index)?;
            log_skipped(&table, index, outcome);
        }

        let mut monitor = Self {
            source,
            table,
            renderer: TerminalRenderer::new(out),
            rearm,
            state: LoopState::Idle,
        };
        monitor.render()?;
        Ok(monitor)
    }

    /// Runs until the source or a fatal condition ends it. Never returns `Ok`.
    ///
    /// # Errors
    /// The first fatal error from [`Monitor::step`].
    pub fn run(&mut self) -> Result<Infallible, MonitorError> {
        loop {
            self.step()?;
        }
    }

    /// Blocks for one completion and processes it.
    ///
    /// # Errors
    /// Fails if the wait fails, the completion violates the table invariants,
    /// the display cannot be written, or the rearm fails fatally.
    pub fn step(&mut self) -> Result<(), MonitorError> {
        let completion = self
            .source
            .wait_for_next_completion()
            .map_err(|err| MonitorError::from_source("wait for completion", None, err))?;

        self.state = LoopState::Delivering(completion.token);
        let result = self.deliver(completion);
        self.state = LoopState::Idle;
        result
    }

    fn deliver(&mut self, completion: Completion) -> Result<(), MonitorError> {
        let index = self.table.update(completion.token, completion.sample)?;
        if let Some(record) = self.table.get(index) {
            debug!(
                crtc = %record.id,
                sequence = record.sequence,
                delta_sequence = record.delta_sequence,
                delta_ns = record.delta_time_ns,
                "vblank"
            );
        }

        self.render()?;
        let outcome = self.rearm.rearm(&mut self.source, &self.table, index)?;
        log_skipped(&self.table, index, outcome);
        Ok(())
    }

    fn render(&mut self) -> Result<(), MonitorError> {
        self.renderer
            .render(&self.table)
            .map_err(MonitorError::Render)
    }

    pub fn table(&self) -> &StateTable {
        &self.table
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn into_parts(self) -> (S, StateTable, W) {
        (self.source, self.table, self.renderer.into_inner())
    }
}

/// A skipped CRTC stays unmonitored until the process restarts.
fn log_skipped(table: &StateTable, index: usize, outcome: RearmOutcome) {
    if outcome == RearmOutcome::Skipped
        && let Some(record) = table.get(index)
    {
        info!(crtc = %record.id, "CRTC disabled, no vblank notifications queued");
    }
}
