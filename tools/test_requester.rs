//! Test Quote Requester
//!
//! Generates random survey profiles and sends them as quote requests over
//! NATS, logging the predicted price brackets.

use beverage_price_pipeline::types::profile::{
    BrandCategory, ConsumeFrequency, ConsumerProfile, ConsumptionSituation, ConsumptionSize,
    FlavorPreference, Gender, IncomeLevel, Level, Occupation, PackagingPreference,
    PurchaseChannel, SelectionFactor, Zone, MAX_AGE, MIN_AGE,
};
use beverage_price_pipeline::types::quote::{PredictionOutcome, QuoteRequest, QuoteResponse};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Random profile generator for testing
struct ProfileGenerator {
    rng: rand::rngs::ThreadRng,
    request_counter: u64,
}

impl ProfileGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            request_counter: 0,
        }
    }

    fn pick<T: Copy>(&mut self, choices: &[T]) -> T {
        // Every survey enum declares at least one answer
        *choices.choose(&mut self.rng).unwrap_or(&choices[0])
    }

    fn generate(&mut self) -> QuoteRequest {
        self.request_counter += 1;

        let profile = ConsumerProfile {
            age: self.rng.gen_range(MIN_AGE..=MAX_AGE),
            gender: self.pick(Gender::ALL),
            zone: self.pick(Zone::ALL),
            income_levels: self.pick(IncomeLevel::ALL),
            occupation: self.pick(Occupation::ALL),
            health_concerns: self.pick(Level::ALL),
            consume_frequency: self.pick(ConsumeFrequency::ALL),
            typical_consumption_situations: self.pick(ConsumptionSituation::ALL),
            packaging_preference: self.pick(PackagingPreference::ALL),
            preferable_consumption_size: self.pick(ConsumptionSize::ALL),
            purchase_channel: self.pick(PurchaseChannel::ALL),
            flavor_preference: self.pick(FlavorPreference::ALL),
            current_brand: self.pick(BrandCategory::ALL),
            brand_awareness: self.pick(Level::ALL),
            primary_selection_factor: self.pick(SelectionFactor::ALL),
        };

        QuoteRequest {
            request_id: Some(format!("req_{:012}", self.request_counter)),
            profile,
            include_record: self.rng.gen_bool(0.1),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_requester=info".parse()?),
        )
        .init();

    info!("Starting Test Quote Requester");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("pricing.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, delay_ms).await;
        }
    };

    let mut generator = ProfileGenerator::new();
    let mut labels: HashMap<String, u64> = HashMap::new();
    let mut failures = 0_u64;

    info!("Sending {} quote requests...", count);

    for i in 0..count {
        let request = generator.generate();
        let payload = serde_json::to_vec(&request)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => match serde_json::from_slice::<QuoteResponse>(&reply.payload) {
                Ok(response) => match response.outcome {
                    PredictionOutcome::Success { label } => {
                        *labels.entry(label.into_inner()).or_insert(0) += 1;
                    }
                    PredictionOutcome::Failure { kind, message } => {
                        failures += 1;
                        warn!(
                            request_id = %response.request_id,
                            kind = kind.as_str(),
                            error = %message,
                            "Quote failed"
                        );
                    }
                },
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, "Undecodable quote response");
                }
            },
            Err(e) => {
                failures += 1;
                warn!(error = %e, "Quote request failed");
            }
        }

        if (i + 1) % 10 == 0 {
            info!("Sent {}/{} requests ({} failed)", i + 1, count, failures);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(failures = failures, labels = ?labels, "Completed {} requests", count);

    Ok(())
}

async fn run_dry_mode(count: u64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ProfileGenerator::new();

    for i in 0..count {
        let request = generator.generate();
        let json = serde_json::to_string_pretty(&request)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
