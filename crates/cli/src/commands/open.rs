use satchel_core::capability::{CapabilityProber, CapabilitySet, ProbeMode};
use satchel_core::fallback::{FallbackResolver, FeatureAccess};
use tracing::warn;

/// Run the `open` command: tell the user how to reach `feature`.
pub async fn run(config_path: &str, feature: &str, course_id: Option<i64>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let resolver = FallbackResolver::new(&config.remote.base_url);

    let capabilities = match config.remote_config() {
        Some(credentials) => {
            let client = super::remote_client(&config)?;
            let mode = ProbeMode::from_strict_flag(config.remote.strict_capabilities);
            CapabilityProber::new(&client, mode)
                .probe(&credentials)
                .await
        }
        None => {
            warn!("No remote token configured, assuming no capabilities");
            CapabilitySet::new()
        }
    };

    match FeatureAccess::resolve(&capabilities, &resolver, feature, course_id) {
        FeatureAccess::Rpc(function) => {
            println!("{feature} is available in-app via {function}");
            println!("Web UI: {}", resolver.resolve(feature, course_id));
        }
        FeatureAccess::Fallback(url) => println!("{url}"),
    }
    Ok(())
}
