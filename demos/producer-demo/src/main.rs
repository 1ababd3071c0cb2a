use nanolog_config::ProducerConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/producer-demo/config.toml".into());
    let config = ProducerConfig::load(config_path).unwrap_or_else(|err| {
        tracing::warn!(%err, "falling back to default config");
        ProducerConfig::default()
    });

    nanolog::init(Some(&PathBuf::from(&config.shm_path)), config.capacity)?;

    info!(
        path = %config.shm_path,
        capacity = config.capacity,
        "producer-demo emitting to nanolog buffer"
    );

    for i in 0..1000u64 {
        nanolog::emit("tick", i, 0);
    }
    nanolog::emit_no_args("done");

    nanolog::deinit();
    Ok(())
}
