use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Command line client for the organ donation registry", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Capability token sent as a bearer token.
    #[arg(short, long, env = "REGISTRY_TOKEN")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the address and role behind the token
    Session,
    /// Register a hospital (admin)
    RegisterHospital {
        #[arg(long)]
        address: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        contact_info: String,
    },
    /// Register a donor (donor intake)
    RegisterDonor {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        blood_type: String,
        #[arg(long)]
        organ: String,
        #[arg(long)]
        tissue_type: String,
    },
    /// Register a recipient (recipient intake)
    RegisterRecipient {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        blood_type: String,
        #[arg(long)]
        needed_organ: String,
        #[arg(long)]
        tissue_type: String,
        #[arg(long)]
        urgency_level: i64,
    },
    /// List donors
    Donors {
        #[arg(long)]
        organ: Option<String>,
        #[arg(long)]
        blood_type: Option<String>,
        #[arg(long)]
        min_revision: Option<u64>,
    },
    /// List recipients
    Recipients {
        #[arg(long)]
        organ: Option<String>,
        #[arg(long)]
        blood_type: Option<String>,
        /// none, asc or desc
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        min_revision: Option<u64>,
    },
    /// Compatible available donors for a recipient
    Candidates { recipient_id: String },
    /// Match a donor to a recipient
    Match { donor_id: String, recipient_id: String },
    /// Confirm an organ retrieval
    Confirm { donor_id: String, recipient_id: String },
    /// Change a recipient's urgency level
    Urgency { recipient_id: String, level: i64 },
    /// List committed matches
    Matches,
    /// Dashboard counters
    Stats,
}

fn query(pairs: &[(&str, Option<String>)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.token))?,
    );

    let request = |method: Method, path: &str| -> RequestBuilder {
        client
            .request(method, format!("{}{}", cli.url, path))
            .headers(headers.clone())
    };

    let builder = match cli.command {
        Commands::Session => request(Method::GET, "/api/v1/session"),
        Commands::RegisterHospital {
            address,
            name,
            location,
            contact_info,
        } => request(Method::POST, "/api/v1/hospitals").json(&json!({
            "address": address,
            "name": name,
            "location": location,
            "contact_info": contact_info,
        })),
        Commands::RegisterDonor {
            name,
            age,
            blood_type,
            organ,
            tissue_type,
        } => request(Method::POST, "/api/v1/donors").json(&json!({
            "name": name,
            "age": age,
            "blood_type": blood_type,
            "organ": organ,
            "tissue_type": tissue_type,
        })),
        Commands::RegisterRecipient {
            name,
            age,
            blood_type,
            needed_organ,
            tissue_type,
            urgency_level,
        } => request(Method::POST, "/api/v1/recipients").json(&json!({
            "name": name,
            "age": age,
            "blood_type": blood_type,
            "needed_organ": needed_organ,
            "tissue_type": tissue_type,
            "urgency_level": urgency_level,
        })),
        Commands::Donors {
            organ,
            blood_type,
            min_revision,
        } => request(Method::GET, "/api/v1/donors").query(&query(&[
            ("organ", organ),
            ("blood_type", blood_type),
            ("min_revision", min_revision.map(|r| r.to_string())),
        ])),
        Commands::Recipients {
            organ,
            blood_type,
            sort,
            min_revision,
        } => request(Method::GET, "/api/v1/recipients").query(&query(&[
            ("organ", organ),
            ("blood_type", blood_type),
            ("sort", sort),
            ("min_revision", min_revision.map(|r| r.to_string())),
        ])),
        Commands::Candidates { recipient_id } => request(
            Method::GET,
            &format!("/api/v1/recipients/{recipient_id}/candidates"),
        ),
        Commands::Match {
            donor_id,
            recipient_id,
        } => request(Method::POST, "/api/v1/matches")
            .json(&json!({ "donor_id": donor_id, "recipient_id": recipient_id })),
        Commands::Confirm {
            donor_id,
            recipient_id,
        } => request(Method::POST, "/api/v1/matches/retrieval")
            .json(&json!({ "donor_id": donor_id, "recipient_id": recipient_id })),
        Commands::Urgency {
            recipient_id,
            level,
        } => request(
            Method::PUT,
            &format!("/api/v1/recipients/{recipient_id}/urgency"),
        )
        .json(&json!({ "urgency_level": level })),
        Commands::Matches => request(Method::GET, "/api/v1/matches"),
        Commands::Stats => request(Method::GET, "/api/v1/stats"),
    };

    print_response(builder.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    if !status.is_success() {
        eprintln!("Error: registry returned status {}", status);
        eprintln!("{}", serde_json::to_string_pretty(&body)?);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
