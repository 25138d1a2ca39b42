use tessera::domain_port::TokenStore as _;
use tessera::settings::*;

#[tokio::main]
async fn main() {
    // Load settings from the default location
    let project_settings = parse_settings(None).unwrap();
    println!("Loaded settings: {:?}", project_settings);

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // Load from a custom path and wire up the configured store
    // $ cargo run --bin settings_demo -- --settings=settings/dev.toml
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref()).unwrap();
    let config = project_settings.session.sessions_config();
    let store = build_token_store(&project_settings.store, &config.token_prefix)
        .await
        .unwrap();
    println!("Sessions config: {:?}", config);
    println!(
        "Store ready: {}",
        store.all_refresh(None).await.is_ok()
    );
}
