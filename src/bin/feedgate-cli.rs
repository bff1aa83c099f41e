use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "feedgate-cli")]
#[command(about = "Management CLI for feedgate", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, env = "FEEDGATE_ADMIN_URL", default_value = "http://localhost:8081")]
    url: String,

    /// Public API base URL, used by `fetch` and `validate`.
    #[arg(long, env = "FEEDGATE_URL", default_value = "http://localhost:8080")]
    api_url: String,

    #[arg(short, long, env = "FEEDGATE_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check system status
    Status,
    /// List provider health and statistics
    Providers,
    /// List pools
    Pools,
    /// Create a pool
    CreatePool {
        id: String,
        category: String,
        #[arg(long, default_value = "priority")]
        strategy: String,
        /// Member provider ids
        #[arg(long = "member")]
        members: Vec<String>,
    },
    /// Add a provider to a pool
    AddMember { pool: String, provider: String },
    /// Remove a provider from a pool
    RemoveMember { pool: String, provider: String },
    /// Force a pool to rotate to its next provider
    Rotate { pool: String },
    /// Show a pool's rotation history
    History {
        pool: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show recent provider attempts
    Attempts {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Fetch a category, passing `key=value` params through
    Fetch { category: String, params: Vec<String> },
    /// Cross-validate a number across providers
    Validate {
        category: String,
        #[arg(long, default_value = "")]
        pointer: String,
        params: Vec<String>,
    },
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
    let admin = |path: &str| format!("{}{}", cli.url.trim_end_matches('/'), path);

    let request = match cli.command {
        Commands::Status => client.get(admin("/admin/status")).headers(headers),
        Commands::Providers => client.get(admin("/admin/providers")).headers(headers),
        Commands::Pools => client.get(admin("/admin/pools")).headers(headers),
        Commands::CreatePool {
            id,
            category,
            strategy,
            members,
        } => client
            .post(admin("/admin/pools"))
            .headers(headers)
            .json(&json!({
                "id": id,
                "category": category,
                "strategy": strategy,
                "members": members,
            })),
        Commands::AddMember { pool, provider } => client
            .post(admin(&format!("/admin/pools/{pool}/members")))
            .headers(headers)
            .json(&json!({ "provider": provider })),
        Commands::RemoveMember { pool, provider } => client
            .delete(admin(&format!("/admin/pools/{pool}/members/{provider}")))
            .headers(headers),
        Commands::Rotate { pool } => client
            .post(admin(&format!("/admin/pools/{pool}/rotate")))
            .headers(headers),
        Commands::History { pool, limit } => client
            .get(admin(&format!("/admin/pools/{pool}/history")))
            .query(&[("limit", limit)])
            .headers(headers),
        Commands::Attempts { limit } => client
            .get(admin("/admin/attempts"))
            .query(&[("limit", limit)])
            .headers(headers),
        Commands::Fetch { category, params } => client
            .get(format!("{}/v1/fetch/{category}", cli.api_url.trim_end_matches('/')))
            .query(&split_params(&params)?),
        Commands::Validate {
            category,
            pointer,
            params,
        } => {
            let mut query = split_params(&params)?;
            query.push(("pointer".to_string(), pointer));
            client
                .get(format!("{}/v1/validate/{category}", cli.api_url.trim_end_matches('/')))
                .query(&query)
        }
    };

    print_response(request.send().await?).await
}

fn split_params(params: &[String]) -> Result<Vec<(String, String)>, Box<dyn std::error::Error>> {
    params
        .iter()
        .map(|param| match param.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => Err(format!("expected key=value, got '{param}'").into()),
        })
        .collect()
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
