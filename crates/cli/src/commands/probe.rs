use satchel_core::capability::{CapabilityProber, ProbeMode, PROBE_FUNCTIONS};

/// Run the `probe` command: report which optional remote functions respond.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let credentials = config
        .remote_config()
        .ok_or_else(|| anyhow::anyhow!("no remote token configured"))?;
    let client = super::remote_client(&config)?;
    let mode = ProbeMode::from_strict_flag(config.remote.strict_capabilities);

    let capabilities = CapabilityProber::new(&client, mode)
        .probe(&credentials)
        .await;

    println!("Capabilities at {} ({:?} mode)", credentials.base_url(), mode);
    for function in PROBE_FUNCTIONS {
        let marker = if capabilities.contains(function) {
            "available"
        } else {
            "absent"
        };
        println!("  {:<40} {}", function, marker);
    }
    Ok(())
}
