//! Answer synthesizer
//!
//! Builds a prompt from the ranked sources, calls the completion client
//! within what is left of the run budget, and keeps only citation markers
//! that point at sources the model was shown.

mod client;
mod prompt;

pub use client::{CompletionClient, CompletionRequest, HttpCompletionClient};
pub use prompt::{build_prompt, Prompt, PromptLimits};

use crate::citation::strip_markers;
use crate::config::SynthesisSettings;
use crate::error::{Result, SearchError};
use crate::query::Query;
use crate::results::RankedResultSet;
use crate::scheduler::{run_with_policy, CallPolicy, RunContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

fn synthesis_timeout(_label: &str, timeout: Duration) -> SearchError {
    SearchError::SynthesisTimeout(timeout.as_millis() as u64)
}

pub struct Synthesizer {
    client: Arc<dyn CompletionClient>,
    settings: SynthesisSettings,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn CompletionClient>, settings: SynthesisSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    /// Time the completion call may take given what is left of the run
    pub fn timeout_for(&self, ctx: &RunContext) -> Duration {
        let reserve = Duration::from_millis(self.settings.reserve_ms);
        Duration::from_millis(self.settings.timeout_ms).min(ctx.remaining().saturating_sub(reserve))
    }

    /// Generate an answer citing `ranked` by id.
    ///
    /// Fails with `SynthesisTimeout` when the budget runs out and
    /// `Unavailable` for any other completion failure.
    pub async fn synthesize(
        &self,
        query: &Query,
        ranked: &RankedResultSet,
        context: Option<&str>,
        ctx: &RunContext,
    ) -> Result<String> {
        if ranked.is_empty() {
            return Err(SearchError::Unavailable("no sources to synthesize from".into()));
        }

        let timeout = self.timeout_for(ctx);
        if timeout.is_zero() {
            warn!("No budget left for synthesis");
            return Err(SearchError::SynthesisTimeout(0));
        }

        let prompt = build_prompt(
            query,
            ranked,
            context,
            PromptLimits {
                max_sources: self.settings.max_sources,
                max_snippet_chars: self.settings.max_snippet_chars,
            },
        );
        let request = CompletionRequest {
            system: self.settings.system_prompt.clone(),
            prompt: prompt.text,
            temperature: self.settings.temperature,
        };

        debug!(
            "Synthesizing from {} sources within {:?}",
            prompt.included_ids.len(),
            timeout
        );
        let scoped = ctx.child(timeout);
        let policy = CallPolicy::new(timeout).on_timeout(synthesis_timeout);

        let answer = run_with_policy(&scoped, &policy, self.client.name(), |_| {
            self.client.complete(&request, &scoped)
        })
        .await
        .map_err(|e| match e {
            SearchError::SynthesisTimeout(_) | SearchError::Cancelled => e,
            other => SearchError::Unavailable(format!("synthesis failed: {other}")),
        })?;

        let answer = strip_markers(&answer, &prompt.included_ids).trim().to_string();
        info!("Synthesized answer of {} chars", answer.chars().count());
        Ok(answer)
    }
}
