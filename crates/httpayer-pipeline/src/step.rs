//! Step declarations and results.

use std::collections::BTreeMap;
use std::time::Duration;

use httpayer::amount::{asset_decimals, format_minor_units};
use httpayer::{PayError, PaymentProof, WireRequest};

type BuildFn = Box<dyn Fn(&PipelineContext<'_>) -> Result<WireRequest, PayError> + Send + Sync>;
type ExtractFn = Box<dyn Fn(&serde_json::Value) -> serde_json::Value + Send + Sync>;

/// Declares one pipeline step: a name, a request builder over prior results,
/// and optionally how to derive the output value later steps consume.
pub struct StepSpec {
    name: String,
    build: BuildFn,
    extract: Option<ExtractFn>,
}

impl StepSpec {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&PipelineContext<'_>) -> Result<WireRequest, PayError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
            extract: None,
        }
    }

    /// A step whose request does not depend on earlier outputs.
    pub fn fixed(name: impl Into<String>, request: WireRequest) -> Self {
        Self::new(name, move |_| Ok(request.clone()))
    }

    /// Derive the step's output value from its JSON response body.
    /// Without an extractor, the whole body is the output.
    pub fn with_output<F>(mut self, extract: F) -> Self
    where
        F: Fn(&serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    {
        self.extract = Some(Box::new(extract));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build_request(
        &self,
        ctx: &PipelineContext<'_>,
    ) -> Result<WireRequest, PayError> {
        (self.build)(ctx)
    }

    pub(crate) fn derive_output(&self, body: &serde_json::Value) -> serde_json::Value {
        match &self.extract {
            Some(extract) => extract(body),
            None => body.clone(),
        }
    }
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSpec").field("name", &self.name).finish()
    }
}

/// Read-only view of the results completed so far, passed to step builders.
pub struct PipelineContext<'a> {
    completed: &'a [StepResult],
}

impl<'a> PipelineContext<'a> {
    pub(crate) fn new(completed: &'a [StepResult]) -> Self {
        Self { completed }
    }

    /// Output value of an earlier step, by name.
    pub fn output(&self, step: &str) -> Option<&serde_json::Value> {
        self.completed
            .iter()
            .find(|r| r.name == step)
            .and_then(|r| r.output.as_ref())
    }

    pub fn results(&self) -> &[StepResult] {
        self.completed
    }
}

/// How a step ended.
#[derive(Debug)]
pub enum StepOutcome {
    Completed { status: u16 },
    /// Attempted and failed; the error is recorded verbatim.
    Failed { error: PayError },
    /// Never attempted: an earlier step halted the pipeline, or it was
    /// cancelled before this step started.
    Skipped,
}

/// Result of one pipeline step.
#[derive(Debug)]
pub struct StepResult {
    pub name: String,
    pub outcome: StepOutcome,
    /// Present iff this step paid a challenge (at most one per step).
    pub proof: Option<PaymentProof>,
    /// `true` when this step's proof moved new funds; `false` when an
    /// earlier step's proof was reused for the same challenge.
    pub fresh: bool,
    pub elapsed: Duration,
    /// Derived output value, input material for later steps.
    pub output: Option<serde_json::Value>,
}

impl StepResult {
    pub(crate) fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Skipped,
            proof: None,
            fresh: false,
            elapsed: Duration::ZERO,
            output: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Completed { .. })
    }

    pub fn error(&self) -> Option<&PayError> {
        match &self.outcome {
            StepOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Final report of a pipeline run, success or fatal abort.
#[derive(Debug)]
pub struct PipelineSummary {
    /// One entry per declared step, in order.
    pub steps: Vec<StepResult>,
    /// Total committed spend, keyed by (asset, network), in minor units.
    /// Only fresh proofs count: a step reusing an earlier step's proof
    /// moved no new funds.
    pub total_spent: BTreeMap<(String, String), u128>,
}

impl PipelineSummary {
    pub(crate) fn new(steps: Vec<StepResult>) -> Self {
        let mut total_spent = BTreeMap::new();
        for proof in steps
            .iter()
            .filter(|s| s.fresh)
            .filter_map(|s| s.proof.as_ref())
        {
            *total_spent
                .entry((proof.asset.clone(), proof.network.clone()))
                .or_insert(0) += proof.amount;
        }
        Self { steps, total_spent }
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.succeeded()).count()
    }

    /// Total spend for one asset/network, in minor units.
    pub fn spent(&self, asset: &str, network: &str) -> u128 {
        self.total_spent
            .get(&(asset.to_string(), network.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Human-readable report for presentation layers.
    pub fn render(&self) -> String {
        let mut out = String::from("=== Pipeline Summary ===\n");
        for (i, step) in self.steps.iter().enumerate() {
            let state = match &step.outcome {
                StepOutcome::Completed { status } => format!("ok ({status})"),
                StepOutcome::Failed { error } => format!("failed: {error}"),
                StepOutcome::Skipped => "skipped".to_string(),
            };
            let payment = match &step.proof {
                Some(p) if step.fresh => format!(
                    " | paid {} {} ({})",
                    format_minor_units(p.amount, asset_decimals(&p.asset)),
                    p.asset,
                    p.network
                ),
                Some(p) => format!(
                    " | reused payment of {} {} ({})",
                    format_minor_units(p.amount, asset_decimals(&p.asset)),
                    p.asset,
                    p.network
                ),
                None => String::new(),
            };
            out.push_str(&format!(
                "{:>2}. {:<24} {}{} [{:.1?}]\n",
                i + 1,
                step.name,
                state,
                payment,
                step.elapsed
            ));
        }
        if self.total_spent.is_empty() {
            out.push_str("Total spent: nothing\n");
        } else {
            out.push_str("Total spent:");
            for ((asset, network), amount) in &self.total_spent {
                out.push_str(&format!(
                    " {} {} ({})",
                    format_minor_units(*amount, asset_decimals(asset)),
                    asset,
                    network
                ));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpayer::ProofKind;

    fn paid_step(name: &str, amount: u128) -> StepResult {
        StepResult {
            name: name.into(),
            outcome: StepOutcome::Completed { status: 200 },
            proof: Some(PaymentProof {
                amount,
                asset: "USDC".into(),
                network: "base".into(),
                kind: ProofKind::Proxy {
                    receipt_id: "r".into(),
                },
            }),
            fresh: true,
            elapsed: Duration::from_millis(120),
            output: None,
        }
    }

    #[test]
    fn summary_totals_by_asset_and_network() {
        let summary = PipelineSummary::new(vec![
            paid_step("a", 50_000),
            paid_step("b", 30_000),
            StepResult::skipped("c"),
        ]);
        assert_eq!(summary.spent("USDC", "base"), 80_000);
        assert_eq!(summary.spent("USDC", "polygon"), 0);
        assert_eq!(summary.completed_count(), 2);
    }

    #[test]
    fn reused_proofs_do_not_inflate_totals() {
        let mut reused = paid_step("b", 50_000);
        reused.fresh = false;
        let summary = PipelineSummary::new(vec![paid_step("a", 50_000), reused]);
        assert_eq!(summary.spent("USDC", "base"), 50_000);
        assert!(summary.render().contains("reused payment of 0.05 USDC (base)"));
    }

    #[test]
    fn render_reports_every_step() {
        let summary = PipelineSummary::new(vec![paid_step("news", 50_000), StepResult::skipped("llm")]);
        let text = summary.render();
        assert!(text.contains("news"));
        assert!(text.contains("paid 0.05 USDC (base)"));
        assert!(text.contains("skipped"));
        assert!(text.contains("Total spent: 0.05 USDC (base)"));
    }
}
