//! End-to-end run against a live paywalled endpoint.
//!
//! Requires a funded wallet (or prepaid account) and network access, so it
//! is ignored by default.
//!
//! Run:  DEMO_URL=https://... cargo test --test e2e_live -- --ignored --nocapture

use std::sync::Arc;

use httpayer::{EngineConfig, PayingClient, WireRequest};
use httpayer_pipeline::{Pipeline, StepSpec};

fn demo_url() -> String {
    std::env::var("DEMO_URL")
        .unwrap_or_else(|_| "https://api.httpayer.com/demo/premium".to_string())
}

#[tokio::test]
#[ignore]
async fn e2e_paid_pipeline() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "httpayer=debug,httpayer_pipeline=debug".into()),
        )
        .try_init();

    let config = EngineConfig::from_env().expect("engine configuration");
    let client = Arc::new(PayingClient::from_config(&config).expect("client from config"));
    let pipeline = Pipeline::new(client.clone());

    let summary = pipeline
        .run(vec![StepSpec::fixed(
            "premium",
            WireRequest::get(demo_url()),
        )])
        .await;

    println!("{}", summary.render());
    assert_eq!(summary.completed_count(), 1);
    if let Some(proof) = &summary.steps[0].proof {
        println!(
            "paid {} {} on {}",
            proof.amount, proof.asset, proof.network
        );
    }
}
