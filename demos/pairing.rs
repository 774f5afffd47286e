//! Device pairing demo.
//!
//! Fetches a pairing code, waits for the user to approve the device on the
//! server, and prints the resulting token set.
//!
//! ```sh
//! PLAYOUT_ENDPOINT=https://music.example.com cargo run --example pairing
//! ```

use playoutrs::{Error, MemoryTokenStore, PlayoutClient, TokenStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let endpoint = std::env::var("PLAYOUT_ENDPOINT")
        .unwrap_or_else(|_| "https://music.example.com".to_string());

    let store = Arc::new(MemoryTokenStore::new(endpoint, "playoutrs/0.1"));
    let client = PlayoutClient::new(store);

    let code = client.code().await?;
    println!("Enter code {} on an authorized device...", code.code);
    client.tokens().update_code(&code.code, &code.access_token);

    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        match client.check_code().await {
            Ok(tokens) => {
                println!("Paired!");
                println!("  AccessToken:  {}", tokens.access_token);
                println!("  RefreshToken: {}", tokens.refresh_token);
                println!("  MediaToken:   {}", tokens.media_token);
                println!("Store these somewhere safe; the demo keeps them in memory only.");
                break;
            }
            // not approved yet, keep polling
            Err(Error::Unauthorized) | Err(Error::Forbidden) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
