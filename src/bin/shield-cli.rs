use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Management CLI for the request-defense pipeline", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: Url,

    #[arg(short, long, env = "SHIELD_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// List active client bans
    Blocks,
    /// Ban a client manually
    Block {
        client: String,
        #[arg(short, long, default_value_t = 900)]
        duration_secs: u64,
    },
    /// Lift a client ban
    Unblock { client: String },
    /// Pipeline counters
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let http = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, url, body) = match cli.command {
        Commands::Status => (Method::GET, cli.url.join("admin/status")?, None),
        Commands::Blocks => (Method::GET, cli.url.join("admin/blocks")?, None),
        Commands::Block {
            client,
            duration_secs,
        } => (
            Method::POST,
            cli.url.join("admin/blocks")?,
            Some(json!({ "client": client, "duration_secs": duration_secs })),
        ),
        Commands::Unblock { client } => {
            let mut url = cli.url.join("admin/blocks/")?;
            url.path_segments_mut()
                .map_err(|_| "admin URL cannot be a base")?
                .pop_if_empty()
                .push(&client);
            (Method::DELETE, url, None)
        }
        Commands::Stats => (Method::GET, cli.url.join("admin/stats")?, None),
    };

    let res = send(&http, method, url, headers, body).await?;
    print_response(res).await
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Value>,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut request = client.request(method, url).headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    request.send().await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
