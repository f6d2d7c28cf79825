//! Sequential pipeline runner.

use std::sync::Arc;
use std::time::Instant;

use httpayer::PayingClient;
use tokio::sync::watch;

use crate::step::{PipelineContext, PipelineSummary, StepOutcome, StepResult, StepSpec};

/// Runs ordered sequences of payment-aware calls.
///
/// Steps execute strictly in order — later steps may consume earlier
/// outputs. On a fatal step error the remaining steps are recorded as
/// skipped and the summary is still produced, so incurred payments are
/// never lost from the report. The runner never retries a failed step;
/// retry policy belongs to the caller re-invoking `run`.
pub struct Pipeline {
    client: Arc<PayingClient>,
}

impl Pipeline {
    pub fn new(client: Arc<PayingClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<PayingClient> {
        &self.client
    }

    /// Run the steps to completion or first fatal error.
    pub async fn run(&self, steps: Vec<StepSpec>) -> PipelineSummary {
        self.run_inner(steps, None).await
    }

    /// Like [`run`](Self::run), but stops starting new steps once `cancel`
    /// carries `true`. The in-flight step always runs to completion: a
    /// payment past the commit point is never abandoned mid-attachment.
    pub async fn run_cancellable(
        &self,
        steps: Vec<StepSpec>,
        cancel: watch::Receiver<bool>,
    ) -> PipelineSummary {
        self.run_inner(steps, Some(cancel)).await
    }

    async fn run_inner(
        &self,
        steps: Vec<StepSpec>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> PipelineSummary {
        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());
        let mut halted = false;

        for spec in steps {
            let cancelled = cancel.as_ref().map(|c| *c.borrow()).unwrap_or(false);
            if halted || cancelled {
                if cancelled && !halted {
                    tracing::info!(step = spec.name(), "pipeline cancelled, skipping step");
                }
                results.push(StepResult::skipped(spec.name()));
                continue;
            }

            tracing::info!(step = spec.name(), "starting pipeline step");
            let started = Instant::now();

            let request = match spec.build_request(&PipelineContext::new(&results)) {
                Ok(request) => request,
                Err(error) => {
                    tracing::error!(step = spec.name(), %error, "request build failed");
                    results.push(StepResult {
                        name: spec.name().to_string(),
                        outcome: StepOutcome::Failed { error },
                        proof: None,
                        fresh: false,
                        elapsed: started.elapsed(),
                        output: None,
                    });
                    halted = true;
                    continue;
                }
            };

            match self.client.execute(request).await {
                Ok(resp) if resp.is_success() => {
                    let output = resp.json().ok().map(|body| spec.derive_output(&body));
                    results.push(StepResult {
                        name: spec.name().to_string(),
                        outcome: StepOutcome::Completed {
                            status: resp.status,
                        },
                        fresh: resp.fresh,
                        proof: resp.proof,
                        elapsed: started.elapsed(),
                        output,
                    });
                }
                Ok(resp) => {
                    // Upstream answered with a non-402 error status. Fatal:
                    // later steps depend on this one's output. Any payment
                    // that happened is still recorded.
                    tracing::error!(
                        step = spec.name(),
                        status = resp.status,
                        "step returned error status, halting pipeline"
                    );
                    results.push(StepResult {
                        name: spec.name().to_string(),
                        outcome: StepOutcome::Failed {
                            error: httpayer::PayError::Transport(format!(
                                "upstream returned status {}",
                                resp.status
                            )),
                        },
                        fresh: resp.fresh,
                        proof: resp.proof,
                        elapsed: started.elapsed(),
                        output: None,
                    });
                    halted = true;
                }
                Err(error) => {
                    tracing::error!(step = spec.name(), %error, "step failed, halting pipeline");
                    results.push(StepResult {
                        name: spec.name().to_string(),
                        outcome: StepOutcome::Failed { error },
                        proof: None,
                        fresh: false,
                        elapsed: started.elapsed(),
                        output: None,
                    });
                    halted = true;
                }
            }
        }

        let summary = PipelineSummary::new(results);
        tracing::info!(
            completed = summary.completed_count(),
            total = summary.steps.len(),
            "pipeline finished"
        );
        summary
    }
}
