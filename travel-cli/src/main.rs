//! travel-cli: command-line client for the travel assistant HTTP API
//!
//! # Subcommands
//! - `chat <user_id> <text>`                   : one conversational turn
//! - `batch <user_id> (<transcript> | --file)` : analyze a recorded conversation
//! - `profile <user_id>`                       : show the travel profile
//! - `sessions <user_id> [-n <limit>]`         : recent sessions
//! - `agents`                                  : persona table
//! - `status`                                  : server, memory and model health
//!
//! Every subcommand accepts `--json` to print the raw server response.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_SESSION_LIMIT: i64 = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "travel-cli", version, about = "Travel assistant command-line client")]
struct Cli {
    /// Server URL (overrides TRAVEL_HTTP_URL env var)
    #[arg(long, env = "TRAVEL_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask the assistant a question
    Chat { user_id: i64, text: String },

    /// Analyze a recorded travel-planning conversation
    Batch {
        user_id: i64,

        /// Transcript text (omit when using --file)
        transcript: Option<String>,

        /// Read the transcript from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show a user's travel profile
    Profile { user_id: i64 },

    /// List a user's recent sessions
    Sessions {
        user_id: i64,

        #[arg(short = 'n', long, default_value_t = DEFAULT_SESSION_LIMIT)]
        limit: i64,
    },

    /// List the assistant personas
    Agents,

    /// Show server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TravelReply {
    pub response: String,
    pub agents_involved: Vec<String>,
    pub processing_time: f64,
    pub session_id: String,
    pub mode: String,
    pub ai_used: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub mode: String,
    pub last_at: String,
    pub turn_count: i64,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub expertise: String,
    pub priority: u8,
}

// ============================================================================
// Formatting
// ============================================================================

pub fn format_reply(reply: &TravelReply) -> String {
    let source = if reply.ai_used { "model" } else { "templates" };
    format!(
        "{}\n\n-- {} | {} | {:.2}s | {} | session {}",
        reply.response.trim_end(),
        reply.agents_involved.join(", "),
        reply.mode,
        reply.processing_time,
        source,
        short_id(&reply.session_id)
    )
}

pub fn format_session(s: &SessionSummary) -> String {
    let marker = if s.is_active { "*" } else { " " };
    format!(
        "{} {}  {:<9} {:>3} turns  {}  {}",
        marker,
        short_id(&s.id),
        s.mode,
        s.turn_count,
        s.last_at.get(..16).unwrap_or(&s.last_at),
        s.title
    )
}

pub fn format_agent(a: &AgentSummary) -> String {
    format!("{} {:<20} P{}  {:<18} {}", a.emoji, a.name, a.priority, a.id, a.expertise)
}

/// First 8 characters of a UUID.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?)
}

/// Send a request and return the JSON body, exiting on transport or HTTP errors.
fn fetch(request: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("travel-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("travel-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    match resp.json() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("travel-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn do_converse(server: &str, path: &str, body: serde_json::Value, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}{}", server, path);
    let value = fetch(client()?.post(&url).json(&body), &url);
    if json_output {
        return print_json(&value);
    }
    let reply: TravelReply = serde_json::from_value(value)?;
    println!("{}", format_reply(&reply));
    Ok(())
}

fn do_profile(server: &str, user_id: i64, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/travel/profile/{}", server, user_id);
    let value = fetch(client()?.get(&url), &url);
    if json_output {
        return print_json(&value);
    }
    let p = &value["profile"];
    let list = |v: &serde_json::Value| -> String {
        v.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "-".to_string())
    };
    println!("Destinations:   {}", list(&p["destinations_of_interest"]));
    println!("Cuisines:       {}", list(&p["cuisine_preferences"]));
    println!("Pace:           {}", p["travel_pace"].as_str().unwrap_or("?"));
    println!("Decision style: {}", p["decision_style"].as_str().unwrap_or("?"));
    println!(
        "Confidence:     {}",
        p["behavioral_notes"]["confidence_level"].as_str().unwrap_or("?")
    );
    println!(
        "Planning:       {}",
        p["behavioral_notes"]["planning_preference"].as_str().unwrap_or("?")
    );
    Ok(())
}

fn do_sessions(server: &str, user_id: i64, limit: i64, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/travel/sessions/{}?limit={}", server, user_id, limit);
    let value = fetch(client()?.get(&url), &url);
    if json_output {
        return print_json(&value);
    }
    let sessions: Vec<SessionSummary> = serde_json::from_value(value["sessions"].clone())?;
    if sessions.is_empty() {
        eprintln!("No sessions for user {}", user_id);
        return Ok(());
    }
    for s in &sessions {
        println!("{}", format_session(s));
    }
    Ok(())
}

fn do_agents(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/agents", server);
    let value = fetch(client()?.get(&url), &url);
    if json_output {
        return print_json(&value);
    }
    let agents: Vec<AgentSummary> = serde_json::from_value(value["agents"].clone())?;
    for a in &agents {
        println!("{}", format_agent(a));
    }
    Ok(())
}

/// GET /health. A 503 still carries a body worth showing.
fn do_status(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = match client()?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("travel-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };
    let healthy = resp.status().is_success();
    let body: serde_json::Value = resp.json().unwrap_or_default();

    if json_output {
        print_json(&body)?;
    } else {
        println!("Server:       {}", body["status"].as_str().unwrap_or("unknown"));
        println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
        println!(
            "PostgreSQL:   {}",
            body["postgresql"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or("?")
        );
        println!(
            "Short-term:   {} ({})",
            body["stm"]["backend"].as_str().unwrap_or("?"),
            body["stm"]["status"].as_str().unwrap_or("?")
        );
        println!(
            "Ollama:       {} {}",
            body["ollama"]["status"].as_str().unwrap_or("?"),
            body["ollama"]["model"].as_str().unwrap_or("")
        );
    }

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Chat { user_id, text } => do_converse(
            &server,
            "/travel/chat",
            serde_json::json!({ "user_id": user_id, "text": text }),
            cli.json,
        ),
        Commands::Batch { user_id, transcript, file } => {
            let transcript = match (transcript, file) {
                (_, Some(path)) => std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e)),
                (Some(text), None) => Ok(text),
                (None, None) => Err(anyhow::anyhow!("provide a transcript or --file")),
            };
            transcript.and_then(|t| {
                do_converse(
                    &server,
                    "/travel/batch",
                    serde_json::json!({ "user_id": user_id, "transcript": t }),
                    cli.json,
                )
            })
        }
        Commands::Profile { user_id } => do_profile(&server, user_id, cli.json),
        Commands::Sessions { user_id, limit } => do_sessions(&server, user_id, limit, cli.json),
        Commands::Agents => do_agents(&server, cli.json),
        Commands::Status => do_status(&server, cli.json),
    };

    if let Err(e) = result {
        eprintln!("travel-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(ai_used: bool) -> TravelReply {
        TravelReply {
            response: "Book the ryokan early.\n".to_string(),
            agents_involved: vec!["TextTripAnalyzer".to_string(), "TripCalmPractice".to_string()],
            processing_time: 1.2345,
            session_id: "3f2b9c1e-0000-4000-8000-000000000000".to_string(),
            mode: "chat".to_string(),
            ai_used,
        }
    }

    // ========================================================================
    // TEST 1: reply footer lists agents, timing and source
    // ========================================================================
    #[test]
    fn test_format_reply_footer() {
        let out = format_reply(&reply(true));
        assert!(out.starts_with("Book the ryokan early.\n\n-- "));
        assert!(out.contains("TextTripAnalyzer, TripCalmPractice"));
        assert!(out.contains("1.23s"));
        assert!(out.contains("| model |"));
        assert!(out.ends_with("session 3f2b9c1e"));
    }

    // ========================================================================
    // TEST 2: template answers are labelled as such
    // ========================================================================
    #[test]
    fn test_format_reply_templates() {
        assert!(format_reply(&reply(false)).contains("| templates |"));
    }

    // ========================================================================
    // TEST 3: session rows mark the active session and trim timestamps
    // ========================================================================
    #[test]
    fn test_format_session_row() {
        let s = SessionSummary {
            id: "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_string(),
            title: "Trip Recording - 2026-03-01 10:15".to_string(),
            mode: "recording".to_string(),
            last_at: "2026-03-01T10:20:11.123Z".to_string(),
            turn_count: 2,
            is_active: true,
        };
        let row = format_session(&s);
        assert!(row.starts_with("* aaaaaaaa"));
        assert!(row.contains("2026-03-01T10:20 "));
        assert!(row.ends_with("Trip Recording - 2026-03-01 10:15"));
    }

    // ========================================================================
    // TEST 4: short_id tolerates short input
    // ========================================================================
    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789"), "01234567");
    }

    // ========================================================================
    // TEST 5: server agent JSON deserializes and formats
    // ========================================================================
    #[test]
    fn test_agent_summary_from_server_json() {
        let value = serde_json::json!({
            "id": "TripCalmPractice",
            "name": "Calm Practice",
            "emoji": "🧘",
            "expertise": "Stress Relief & Calm",
            "description": "ignored",
            "keywords": ["calm"],
            "priority": 1,
            "routing_key": "stress_relief"
        });
        let agent: AgentSummary = serde_json::from_value(value).unwrap();
        let line = format_agent(&agent);
        assert!(line.contains("Calm Practice"));
        assert!(line.contains("P1"));
    }
}
