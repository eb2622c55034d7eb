//! Admin helpers: secret generation, password hashing, config and
//! credential checks.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use mnemosine::api::auth::{hash_password, Authenticator};
use mnemosine::config::Config;

/// Random bytes, URL-safe base64 encoded without padding.
///
/// Bytes come from v4 UUIDs, which draw on the OS CSPRNG.
pub fn generate_secret_key(length: usize) -> Result<String> {
    if length == 0 {
        bail!("--length must be at least 1");
    }
    let mut bytes = Vec::with_capacity(length + 16);
    while bytes.len() < length {
        bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    }
    bytes.truncate(length);
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub fn cmd_hash_password(password: &str) -> Result<()> {
    if password.is_empty() {
        bail!("password must not be empty");
    }
    let hash = hash_password(password).context("Failed to hash password")?;
    println!("{hash}");
    Ok(())
}

pub fn cmd_validate_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let problems = config.problems();
    if problems.is_empty() {
        println!("Configuration is valid.");
        println!("  app:       {} (debug: {})", config.app.name, config.app.debug);
        println!("  listen:    {}:{}", config.server.host, config.server.port);
        println!("  api:       {}", config.app.api_prefix);
        println!("  model:     {}", config.providers.default_model);
        println!("  pool size: {}", config.pool.size);
        println!(
            "  cache:     {} (ttl {}s)",
            if config.cache.enabled { "enabled" } else { "disabled" },
            config.cache.ttl_secs
        );
        return Ok(());
    }
    eprintln!("Configuration has {} problem(s):", problems.len());
    for problem in &problems {
        eprintln!("  - {problem}");
    }
    bail!("invalid configuration")
}

pub fn cmd_test_auth(username: &str, password: &str) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let auth = Authenticator::new(&config.auth);
    let token = auth
        .login(username, password)
        .context("Authentication failed")?;
    let user = auth
        .resolve(&token.access_token)
        .context("Issued token did not verify")?;

    println!("Authentication succeeded for '{}'.", user.username);
    println!("  token expires in {}s", token.expires_in);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_key_length() {
        let key = generate_secret_key(32).unwrap();
        // 32 bytes -> 43 unpadded base64 chars.
        assert_eq!(key.len(), 43);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_secret_key_is_random() {
        assert_ne!(generate_secret_key(32).unwrap(), generate_secret_key(32).unwrap());
    }

    #[test]
    fn test_generate_secret_key_odd_length() {
        let key = generate_secret_key(20).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(key).unwrap().len(), 20);
    }

    #[test]
    fn test_generate_secret_key_rejects_zero() {
        assert!(generate_secret_key(0).is_err());
    }
}
