use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "ddogsvc-probe")]
#[command(about = "Traffic generator for the ddogsvc demo endpoints", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "/ddogsvc")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Behaviour {
    /// Seconds the endpoint should wait before answering
    #[arg(short, long)]
    latency: Option<i64>,

    /// 200, 400, 403, anything else answers 500
    #[arg(short, long)]
    status_code: Option<i64>,

    /// Number of requests to send
    #[arg(short, long, default_value_t = 1)]
    count: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Call the accounts endpoint (ignores its deadline)
    Accounts(Behaviour),
    /// Call the customers endpoint (stops at its deadline)
    Customers(Behaviour),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let (endpoint, behaviour) = match &cli.command {
        Commands::Accounts(b) => ("accounts", b),
        Commands::Customers(b) => ("customers", b),
    };
    let target = format!("{}{}/{}", cli.url.trim_end_matches('/'), cli.prefix, endpoint);

    let mut query = Vec::new();
    if let Some(latency) = behaviour.latency {
        query.push(("latency", latency.to_string()));
    }
    if let Some(status) = behaviour.status_code {
        query.push(("status_code", status.to_string()));
    }

    let mut statuses: BTreeMap<u16, u32> = BTreeMap::new();
    for _ in 0..behaviour.count {
        let res = client.get(&target).query(&query).send().await?;
        *statuses.entry(res.status().as_u16()).or_default() += 1;
        print_response(res).await?;
    }

    println!("--- {} request(s) to {}", behaviour.count, target);
    for (status, n) in statuses {
        println!("{status}: {n}");
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}\n{}", status, serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}\n{}", status, text),
    }
    Ok(())
}
