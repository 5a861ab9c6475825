//! Lists every registered model using a client secret credential.
//!
//! Expects `ADT_TENANT_ID`, `ADT_CLIENT_ID`, `ADT_CLIENT_SECRET` and
//! `ADT_INSTANCE_URL` in the environment (or `twingraph/.env.local`).

use std::error::Error;
use std::process;

use twingraph::{resolve_credential, CredentialStrategy, EndpointConfig, TwinGraphClient};

#[tokio::main]
async fn main() {
    dotenvy::from_filename("./twingraph/.env.local").ok();

    if let Err(e) = run().await {
        println!("Authentication or client creation error: {}", e);
        process::exit(0);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = EndpointConfig::from_env()?;

    let credential = resolve_credential(CredentialStrategy::ClientSecret, &config).await?;
    let client = TwinGraphClient::new(credential, config.instance_url.clone());

    let mut models = client.list_models();
    while let Some(model) = models.try_next().await? {
        println!("Id: {}", model.id);
    }

    println!("Done");
    Ok(())
}
