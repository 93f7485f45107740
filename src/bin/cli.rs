// Live-session relay CLI
// Checks a running relay, joins rooms by hand, drives the lifecycle endpoints
// and runs end-to-end validation scenarios.

use clap::{Parser, Subcommand};
use colored::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Live-session relay CLI", long_about = None)]
struct Cli {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:3001")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get client bootstrap configuration
    Config,

    /// Test WebSocket connection
    Connect,

    /// Join a room and print everything relayed to it
    Join {
        #[arg(short, long)]
        room_id: String,

        #[arg(short, long)]
        user_id: String,

        /// Keep listening until Ctrl+C
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Mark a live session as started
    Start {
        #[arg(short, long)]
        session_id: String,

        #[arg(short, long)]
        teacher_id: String,
    },

    /// Mark a live session as finished
    End {
        #[arg(short, long)]
        session_id: String,
    },

    /// Show a live-session record
    Show {
        #[arg(short, long)]
        session_id: String,
    },

    /// Run automated validation scenarios
    Validate {
        /// Run all validation scenarios
        #[arg(short, long)]
        all: bool,

        /// Run one scenario
        #[arg(short, long)]
        scenario: Option<String>,
    },
}

const SCENARIOS: &[(&str, &str)] = &[
    ("connection", "Basic WebSocket connection test"),
    ("relay", "Offer/answer/ICE relay between two peers"),
    ("isolation", "Events never cross rooms"),
    ("end-session", "end-session notifies and empties the room"),
    ("lifecycle", "start/start/end against the lifecycle API"),
    ("unknown-session", "end on an unknown session is a 404"),
];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::Config => check_config(&cli.server).await,
        Commands::Connect => test_connection(&cli.server).await,
        Commands::Join {
            room_id,
            user_id,
            keep_alive,
        } => join_room(&cli.server, room_id, user_id, *keep_alive).await,
        Commands::Start {
            session_id,
            teacher_id,
        } => {
            let body = json!({ "sessionId": session_id, "teacherId": teacher_id });
            print_lifecycle_response(post_lifecycle(&cli.server, "start", &body).await);
        }
        Commands::End { session_id } => {
            let body = json!({ "sessionId": session_id });
            print_lifecycle_response(post_lifecycle(&cli.server, "end", &body).await);
        }
        Commands::Show { session_id } => {
            print_lifecycle_response(get_session(&cli.server, session_id).await);
        }
        Commands::Validate { all, scenario } => {
            if *all {
                run_all_validations(&cli.server).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli.server, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/signaling/health", server);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Health check passed", "✓".green());
            if let Ok(body) = resp.json::<Value>().await {
                println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                println!("  Rooms: {}", body["rooms"]);
                println!("  Connections: {}", body["connections"]);
            }
        }
        Ok(resp) => println!("{} Health check failed: {}", "✗".red(), resp.status()),
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching client configuration...".cyan());

    let url = format!("http://{}/signaling/config", server);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Config endpoint accessible", "✓".green());
            if let Ok(body) = resp.json::<Value>().await {
                println!("\nConfiguration:");
                println!("{}", pretty(&body));
            }
        }
        Ok(resp) => println!("{} Config fetch failed: {}", "✗".red(), resp.status()),
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn test_connection(server: &str) {
    println!("{}", "Testing WebSocket connection...".cyan());

    let url = ws_url(server);
    match connect_async(&url).await {
        Ok((ws_stream, _)) => {
            println!("{} WebSocket connection established", "✓".green());
            println!("  URL: {}", url);
            drop(ws_stream);
            println!("{} Connection closed cleanly", "✓".green());
        }
        Err(e) => println!("{} WebSocket connection failed: {}", "✗".red(), e),
    }
}

async fn join_room(server: &str, room_id: &str, user_id: &str, keep_alive: bool) {
    println!("{}", "Joining room...".cyan());
    println!("  Room ID: {}", room_id);
    println!("  User ID: {}", user_id);

    let Some((mut write, mut read)) = open_socket(server).await else {
        return;
    };

    let msg = json!({ "type": "join-room", "roomId": room_id, "userId": user_id });
    if write.send(Message::Text(msg.to_string())).await.is_err() {
        println!("{} Failed to send join-room", "✗".red());
        return;
    }
    println!("{} join-room sent", "✓".green());

    if !keep_alive {
        println!("\n{}", "⚠ Note: connection closes now and leaves the room.".yellow());
        println!("Use {} to keep listening.", "--keep-alive".cyan());
        return;
    }

    println!("\n{}", "Listening for relayed events...".yellow());
    println!("Press {} to disconnect.", "Ctrl+C".bold());

    loop {
        match timeout(Duration::from_secs(30), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                println!("{} {}", "◀".green(), text.bright_white());
                if let Ok(event) = serde_json::from_str::<Value>(&text) {
                    if event["type"] == "end-session" {
                        println!("{} Session ended by host; no longer in the room", "■".yellow());
                    }
                }
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                println!("{} Server closed the connection", "✗".yellow());
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} Connection error: {}", "✗".red(), e);
                break;
            }
            Ok(None) => {
                println!("{} Connection closed", "✗".yellow());
                break;
            }
            // Idle; keep listening
            Err(_) => continue,
        }
    }
}

async fn post_lifecycle(server: &str, action: &str, body: &Value) -> Result<(u16, Value), String> {
    let url = format!("http://{}/api/live-sessions/{}", server, action);
    let resp = reqwest::Client::new()
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, body))
}

async fn get_session(server: &str, session_id: &str) -> Result<(u16, Value), String> {
    let url = format!(
        "http://{}/api/live-sessions/{}",
        server,
        urlencoding::encode(session_id)
    );
    let resp = reqwest::get(&url).await.map_err(|e| e.to_string())?;
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, body))
}

fn print_lifecycle_response(result: Result<(u16, Value), String>) {
    match result {
        Ok((status, body)) if (200..300).contains(&status) => {
            println!("{} {}", "✓".green(), status);
            println!("{}", pretty(&body));
        }
        Ok((status, body)) => {
            println!("{} {}", "✗".red(), status);
            println!(
                "  {}: {}",
                body["error"]["code"].as_str().unwrap_or("ERROR"),
                body["error"]["message"].as_str().unwrap_or("")
            );
        }
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    for (name, description) in SCENARIOS {
        println!("  {} - {}", name.cyan(), description);
    }
    println!("\nExample: relay-cli validate --scenario relay");
}

async fn run_scenario(server: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    let Some(result) = dispatch_scenario(server, scenario).await else {
        println!("{} Unknown scenario: {}", "✗".red(), scenario);
        list_scenarios();
        return;
    };

    if result {
        println!("\n{} Scenario passed", "✓".green().bold());
    } else {
        println!("\n{} Scenario failed", "✗".red().bold());
    }
}

async fn dispatch_scenario(server: &str, scenario: &str) -> Option<bool> {
    let result = match scenario {
        "connection" => validate_connection(server).await,
        "relay" => validate_relay(server).await,
        "isolation" => validate_isolation(server).await,
        "end-session" => validate_end_session(server).await,
        "lifecycle" => validate_lifecycle(server).await,
        "unknown-session" => validate_unknown_session(server).await,
        _ => return None,
    };
    Some(result)
}

async fn run_all_validations(server: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    let mut failed = 0;

    for (scenario, _) in SCENARIOS {
        println!("\n{} Testing: {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        if dispatch_scenario(server, scenario).await == Some(true) {
            passed += 1;
        } else {
            failed += 1;
        }

        sleep(Duration::from_millis(200)).await;
    }

    println!("\n{}", "═".repeat(60).green());
    println!("{}", "Validation Summary".bold());
    println!("{}", "═".repeat(60).green());
    println!("  {} {}", "Passed:".green(), passed);
    println!("  {} {}", "Failed:".red(), failed);
}

async fn validate_connection(server: &str) -> bool {
    match open_socket(server).await {
        Some(_) => {
            println!("{} Connected to {}", "✓".green(), ws_url(server));
            true
        }
        None => false,
    }
}

async fn validate_relay(server: &str) -> bool {
    let room = unique_id("relay");

    let Some((mut w1, mut r1)) = open_socket(server).await else { return false };
    let Some((mut w2, mut r2)) = open_socket(server).await else { return false };

    if !send_event(&mut w1, json!({ "type": "join-room", "roomId": room, "userId": "peer-1" })).await {
        return false;
    }
    sleep(Duration::from_millis(100)).await;
    if !send_event(&mut w2, json!({ "type": "join-room", "roomId": room, "userId": "peer-2" })).await {
        return false;
    }

    if !expect_event(&mut r1, "user-joined").await {
        return false;
    }

    let offer = json!({ "type": "offer", "sdp": "v=0" });
    send_event(&mut w1, json!({ "type": "offer", "offer": offer, "roomId": room })).await;
    let Some(event) = next_event(&mut r2).await else { return false };
    if event["offer"] != offer {
        println!("{} Offer payload changed in transit: {}", "✗".red(), event);
        return false;
    }
    println!("{} Offer relayed verbatim", "✓".green());

    send_event(&mut w2, json!({ "type": "answer", "answer": {"type": "answer", "sdp": "v=0"}, "roomId": room })).await;
    if !expect_event(&mut r1, "answer").await {
        return false;
    }

    send_event(&mut w1, json!({ "type": "ice-candidate", "candidate": {"candidate": "c"}, "roomId": room })).await;
    expect_event(&mut r2, "ice-candidate").await
}

async fn validate_isolation(server: &str) -> bool {
    let room_a = unique_id("iso-a");
    let room_b = unique_id("iso-b");

    let Some((mut w1, _r1)) = open_socket(server).await else { return false };
    let Some((mut w2, mut r2)) = open_socket(server).await else { return false };

    send_event(&mut w1, json!({ "type": "join-room", "roomId": room_a, "userId": "a" })).await;
    send_event(&mut w2, json!({ "type": "join-room", "roomId": room_b, "userId": "b" })).await;
    sleep(Duration::from_millis(100)).await;

    send_event(&mut w1, json!({ "type": "mute-all", "roomId": room_a })).await;

    match timeout(Duration::from_millis(500), r2.next()).await {
        Err(_) => {
            println!("{} No event leaked into the other room", "✓".green());
            true
        }
        Ok(msg) => {
            println!("{} Unexpected event in other room: {:?}", "✗".red(), msg);
            false
        }
    }
}

async fn validate_end_session(server: &str) -> bool {
    let room = unique_id("end");

    let Some((mut host_w, _host_r)) = open_socket(server).await else { return false };
    let Some((mut guest_w, mut guest_r)) = open_socket(server).await else { return false };

    send_event(&mut host_w, json!({ "type": "join-room", "roomId": room, "userId": "host" })).await;
    sleep(Duration::from_millis(100)).await;
    send_event(&mut guest_w, json!({ "type": "join-room", "roomId": room, "userId": "guest" })).await;
    sleep(Duration::from_millis(100)).await;

    send_event(&mut host_w, json!({ "type": "end-session", "roomId": room })).await;
    if !expect_event(&mut guest_r, "end-session").await {
        return false;
    }

    send_event(&mut host_w, json!({ "type": "mute-all", "roomId": room })).await;
    match timeout(Duration::from_millis(500), guest_r.next()).await {
        Err(_) => {
            println!("{} Room is empty after end-session", "✓".green());
            true
        }
        Ok(msg) => {
            println!("{} Guest still reachable after end-session: {:?}", "✗".red(), msg);
            false
        }
    }
}

async fn validate_lifecycle(server: &str) -> bool {
    let session_id = unique_id("session");

    let first = json!({ "sessionId": session_id, "teacherId": "teacher-1" });
    let second = json!({ "sessionId": session_id, "teacherId": "teacher-2" });

    let (Ok((200, _)), Ok((200, started))) = (
        post_lifecycle(server, "start", &first).await,
        post_lifecycle(server, "start", &second).await,
    ) else {
        println!("{} start failed", "✗".red());
        return false;
    };

    if started["teacherId"] != "teacher-2" || started["status"] != "live" {
        println!("{} Unexpected record after restart: {}", "✗".red(), started);
        return false;
    }
    println!("{} Second start overwrote teacher", "✓".green());

    match post_lifecycle(server, "end", &json!({ "sessionId": session_id })).await {
        Ok((200, ended)) if ended["status"] == "finished" && ended["endedAt"].is_string() => {
            println!("{} Session finished", "✓".green());
            true
        }
        other => {
            println!("{} end failed: {:?}", "✗".red(), other);
            false
        }
    }
}

async fn validate_unknown_session(server: &str) -> bool {
    let session_id = unique_id("missing");

    match post_lifecycle(server, "end", &json!({ "sessionId": session_id })).await {
        Ok((404, _)) => {}
        other => {
            println!("{} Expected 404, got {:?}", "✗".red(), other);
            return false;
        }
    }

    match get_session(server, &session_id).await {
        Ok((404, _)) => {
            println!("{} end did not create a record", "✓".green());
            true
        }
        other => {
            println!("{} Record exists after failed end: {:?}", "✗".red(), other);
            false
        }
    }
}

async fn open_socket(server: &str) -> Option<(WsWrite, WsRead)> {
    match connect_async(ws_url(server)).await {
        Ok((ws_stream, _)) => Some(ws_stream.split()),
        Err(e) => {
            println!("{} Cannot connect: {}", "✗".red(), e);
            None
        }
    }
}

async fn send_event(write: &mut WsWrite, event: Value) -> bool {
    match write.send(Message::Text(event.to_string())).await {
        Ok(()) => true,
        Err(e) => {
            println!("{} Failed to send {}: {}", "✗".red(), event["type"], e);
            false
        }
    }
}

async fn next_event(read: &mut WsRead) -> Option<Value> {
    loop {
        match timeout(Duration::from_secs(3), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).ok(),
            Ok(Some(Ok(_))) => continue,
            Ok(other) => {
                println!("{} Connection ended: {:?}", "✗".red(), other);
                return None;
            }
            Err(_) => {
                println!("{} Timeout waiting for event", "✗".red());
                return None;
            }
        }
    }
}

async fn expect_event(read: &mut WsRead, expected: &str) -> bool {
    match next_event(read).await {
        Some(event) if event["type"] == expected => {
            println!("{} Received {}", "✓".green(), expected);
            true
        }
        Some(event) => {
            println!("{} Expected {}, got {}", "✗".red(), expected, event);
            false
        }
        None => false,
    }
}

fn ws_url(server: &str) -> String {
    format!("ws://{}/signaling", server)
}

fn unique_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    format!("{}-{:06}", prefix, rng.gen_range(100000..999999))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
