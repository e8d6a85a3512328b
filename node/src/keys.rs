//! Persisted libp2p identity

use anyhow::{anyhow, Context, Result};
use libp2p::identity::Keypair;
use std::path::Path;
use tracing::info;

/// Load the identity stored at `key_path`, or generate and store a new one
pub fn load_or_create_keypair(key_path: &Path) -> Result<Keypair> {
    if key_path.exists() {
        let keypair = load_keypair(key_path)?;
        info!("Loaded identity {} from {}", keypair.public().to_peer_id(), key_path.display());
        return Ok(keypair);
    }

    if let Some(dir) = key_path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let keypair = Keypair::generate_ed25519();
    save_keypair(&keypair, key_path)?;
    info!(
        "Generated identity {}, saved to {}",
        keypair.public().to_peer_id(),
        key_path.display()
    );

    Ok(keypair)
}

pub fn load_keypair(key_path: &Path) -> Result<Keypair> {
    let content = std::fs::read_to_string(key_path)
        .with_context(|| format!("reading {}", key_path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)?;

    let secret_hex = value
        .get("secret_key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("{} has no secret_key", key_path.display()))?;
    let bytes = hex::decode(secret_hex)?;

    Ok(Keypair::from_protobuf_encoding(&bytes)?)
}

pub fn save_keypair(keypair: &Keypair, key_path: &Path) -> Result<()> {
    let info = serde_json::json!({
        "peer_id": keypair.public().to_peer_id().to_string(),
        "secret_key": hex::encode(keypair.to_protobuf_encoding()?),
    });

    std::fs::write(key_path, serde_json::to_string_pretty(&info)?)?;
    Ok(())
}
