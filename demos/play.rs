//! Interactive playback demo.
//!
//! Plays the user's current playlist and takes single-letter commands on
//! stdin: `n` next, `p` previous, `space`+enter pause/resume, `q` quit.
//!
//! ```sh
//! PLAYOUT_ENDPOINT=https://music.example.com \
//! PLAYOUT_ACCESS_TOKEN=... PLAYOUT_REFRESH_TOKEN=... PLAYOUT_MEDIA_TOKEN=... \
//! cargo run --example play
//! ```

use playoutrs::{MemoryTokenStore, Player, PlayoutClient, Reporter, TokenSet, TokenStore};
use std::io::BufRead;
use std::sync::Arc;
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let endpoint = std::env::var("PLAYOUT_ENDPOINT")
        .unwrap_or_else(|_| "https://music.example.com".to_string());
    let store = Arc::new(MemoryTokenStore::new(endpoint, "playoutrs/0.1"));
    store.store_tokens(&TokenSet {
        access_token: std::env::var("PLAYOUT_ACCESS_TOKEN").unwrap_or_default(),
        refresh_token: std::env::var("PLAYOUT_REFRESH_TOKEN").unwrap_or_default(),
        media_token: std::env::var("PLAYOUT_MEDIA_TOKEN").unwrap_or_default(),
    });

    let client = Arc::new(PlayoutClient::new(store));
    let spiff = client.playlist().await?;
    println!(
        "{}: {} entries",
        spiff.playlist.title,
        spiff.playlist.entries.len()
    );

    let player = Player::new(client.clone(), spiff).with_on_track(|_, now| {
        println!("▶ {} — {}", now.entry.creator, now.entry.title);
        if let Some(metadata) = &now.icy_metadata {
            if let Some(title) = &metadata.stream_title {
                println!("  {title}");
            }
        }
    });
    let player = Reporter::new(client, Handle::current()).attach(player);
    let controls = player.controls();

    // stdin command loop
    let stdin_controls = controls.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line.as_deref().map(str::trim) {
                Ok("n") => stdin_controls.skip_forward(),
                Ok("p") => stdin_controls.skip_backward(),
                Ok("") | Ok(" ") => stdin_controls.pause(),
                Ok("q") => {
                    stdin_controls.stop();
                    break;
                }
                _ => {}
            }
        }
    });

    let handle = Handle::current();
    tokio::task::spawn_blocking(move || player.run(handle)).await??;
    Ok(())
}
