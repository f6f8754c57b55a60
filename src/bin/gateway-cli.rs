use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the order gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "ORDER_GATEWAY_URL")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION", env = "ORDER_GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List circuit breaker states
    Breakers,
    /// Reset one circuit breaker to closed
    Reset {
        service: String,
        #[arg(default_value = "names")]
        operation: String,
    },
    /// Show the instances the registry resolves for a service
    Instances { name: String },
    /// Fetch order names through the gateway
    Names,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Breakers => {
            client
                .get(format!("{}/admin/breakers", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Reset { service, operation } => {
            client
                .post(format!("{}/admin/breakers/{}/{}/reset", cli.url, service, operation))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Instances { name } => {
            client
                .get(format!("{}/service-instances/{}", cli.url, name))
                .send()
                .await?
        }
        Commands::Names => client.get(format!("{}/orders/names", cli.url)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
