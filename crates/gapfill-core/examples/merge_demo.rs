use gapfill_core::prelude::*;
use gapfill_core::provider::MockProvider;
use gapfill_core::FailureReason;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Gapfill Merge Demo");
    println!("------------------");

    let provider = MockProvider::new()
        .with_response("colour", "red")
        .with_response("thing", "car")
        .with_response("place", "garage")
        .with_delay("thing", Duration::from_millis(50));

    let registry = DocumentRegistry::global();
    let doc = registry.create_document("Park the |_colour_||_thing_| inside the big old |_place_|.");
    let gaps = registry.discover_gaps(doc)?;
    println!("Discovered {} gaps", gaps.len());

    let config = EngineConfig::default().with_policy(MergePolicy::Merge);
    let engine = GapResolutionEngine::new(provider, registry.clone()).with_config(config);

    let report = engine.resolve_document(doc).await?;
    println!("Result: {}", report.text);

    for outcome in &report.outcomes {
        let state = outcome.token.state();
        match state {
            GapState::Failed(FailureReason::GuessUnavailable) => {
                println!("  {} -> no usable guess", outcome.gap())
            }
            _ => println!("  {} -> {:?}", outcome.gap(), state),
        }
    }

    registry.destroy_document(doc)?;
    Ok(())
}
