//! Placard admin CLI
//!
//! Talks to a running player's control API. Any player will do: quick
//! play, rename, and untargeted playback commands fan out through the
//! shared store and command bus regardless of which instance received
//! them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};

use placard_common::model::{Device, NowPlaying};
use placard_common::time::now_millis;

#[derive(Parser, Debug)]
#[command(name = "placard-ctl")]
#[command(about = "Admin CLI for placard signage players")]
#[command(version)]
struct Args {
    /// Base URL of a player's control API
    #[arg(long, default_value = "http://127.0.0.1:5850", env = "PLACARD_URL")]
    url: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List known devices with their liveness
    Devices,
    /// Show the globally published now-playing snapshot
    Now,
    /// Show the contacted player's own playback state
    State,
    /// Resume playback
    Play {
        /// Only this device acts on the command
        #[arg(long)]
        target: Option<String>,
    },
    /// Hold the current item on screen
    Pause {
        #[arg(long)]
        target: Option<String>,
    },
    /// Advance to the next playlist item
    Next {
        #[arg(long)]
        target: Option<String>,
    },
    /// Step back to the previous playlist item
    Prev {
        #[arg(long)]
        target: Option<String>,
    },
    /// Pin every player to a playlist position
    Quickplay {
        playlist_id: String,
        index: usize,
    },
    /// Play one media item everywhere
    QuickplayMedia { media_id: String },
    /// Rename a device
    Rename { device_id: String, name: String },
}

#[derive(Debug, Deserialize)]
struct DeviceListResponse {
    devices: Vec<DeviceInfo>,
}

#[derive(Debug, Deserialize)]
struct DeviceInfo {
    #[serde(flatten)]
    device: Device,
    active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackStateResponse {
    state: Value,
    playlist_id: Option<String>,
    index: Option<usize>,
    now_playing: Option<NowPlaying>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new(&args.url);

    match args.command {
        Cmd::Devices => devices(&client).await,
        Cmd::Now => now(&client).await,
        Cmd::State => state(&client).await,
        Cmd::Play { target } => control(&client, "play", target).await,
        Cmd::Pause { target } => control(&client, "pause", target).await,
        Cmd::Next { target } => control(&client, "next", target).await,
        Cmd::Prev { target } => control(&client, "prev", target).await,
        Cmd::Quickplay { playlist_id, index } => {
            client
                .post(
                    "/api/v1/quickplay",
                    Some(json!({"playlistId": playlist_id, "index": index})),
                )
                .await?;
            println!("Quick play sent: {playlist_id}[{index}]");
            Ok(())
        }
        Cmd::QuickplayMedia { media_id } => {
            client
                .post("/api/v1/quickplay/media", Some(json!({"mediaId": media_id})))
                .await?;
            println!("Quick play sent: {media_id}");
            Ok(())
        }
        Cmd::Rename { device_id, name } => {
            client
                .post(
                    &format!("/api/v1/devices/{device_id}/rename"),
                    Some(json!({"name": name})),
                )
                .await?;
            println!("Renamed {device_id} to '{name}'");
            Ok(())
        }
    }
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Self::decode(response).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let detail = body["status"].as_str().unwrap_or("no detail");
            bail!("player returned {status}: {detail}");
        }
        Ok(body)
    }
}

async fn devices(client: &Client) -> Result<()> {
    let body = client.get("/api/v1/devices").await?;
    let list: DeviceListResponse = serde_json::from_value(body).context("parse device list")?;

    if list.devices.is_empty() {
        println!("No devices registered");
        return Ok(());
    }

    let now = now_millis();
    println!("{:<28} {:<20} {:<8} {:<12} PLAYING", "ID", "NAME", "STATUS", "LAST SEEN");
    for info in list.devices {
        let status = if info.active { "ACTIVE" } else { "INACTIVE" };
        let playing = info
            .device
            .now_playing
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("-");
        println!(
            "{:<28} {:<20} {:<8} {:<12} {}",
            info.device.id,
            info.device.name,
            status,
            ago(now, info.device.last_seen),
            playing,
        );
    }
    Ok(())
}

async fn now(client: &Client) -> Result<()> {
    let body = client.get("/api/v1/nowplaying").await?;
    match serde_json::from_value::<Option<NowPlaying>>(body)? {
        None => println!("Nothing playing"),
        Some(snapshot) => {
            println!("{} ({:?})", snapshot.name, snapshot.kind);
            println!("  id:    {}", snapshot.id);
            println!("  src:   {}", snapshot.src);
            println!("  since: {}", ago(now_millis(), snapshot.at));
        }
    }
    Ok(())
}

async fn state(client: &Client) -> Result<()> {
    let body = client.get("/api/v1/playback/state").await?;
    let state: PlaybackStateResponse = serde_json::from_value(body).context("parse state")?;

    println!("state: {}", state.state.as_str().unwrap_or("?"));
    if let Some(playlist_id) = state.playlist_id {
        println!("playlist: {playlist_id}");
    }
    if let Some(index) = state.index {
        println!("index: {index}");
    }
    match state.now_playing {
        Some(snapshot) => println!("playing: {}", snapshot.name),
        None => println!("playing: -"),
    }
    Ok(())
}

async fn control(client: &Client, action: &str, target: Option<String>) -> Result<()> {
    let body = target.map(|id| json!({"targetId": id}));
    client
        .post(&format!("/api/v1/playback/{action}"), body)
        .await?;
    println!("Command '{action}' sent");
    Ok(())
}

/// "37s ago", rolling over to minutes for devices that went quiet.
fn ago(now: u64, then: u64) -> String {
    let secs = now.saturating_sub(then) / 1000;
    if secs < 120 {
        format!("{secs}s ago")
    } else {
        format!("{}m ago", secs / 60)
    }
}
