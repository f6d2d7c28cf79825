//! Multi-step orchestration over payment-gated HTTP APIs.
//!
//! A [`Pipeline`] sequences [`StepSpec`]s through a shared
//! [`httpayer::PayingClient`]: each step may build its request from earlier
//! steps' outputs, payments are resolved per step through the client's 402
//! cycle, and the final [`PipelineSummary`] reports every step's outcome
//! together with the total spend — including after a fatal mid-pipeline
//! failure.

mod pipeline;
mod step;

pub use pipeline::Pipeline;
pub use step::{PipelineContext, PipelineSummary, StepOutcome, StepResult, StepSpec};
