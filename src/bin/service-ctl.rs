use clap::{Parser, Subcommand};
use reqwest::StatusCode;

#[derive(Parser)]
#[command(name = "service-ctl")]
#[command(about = "Management CLI for the service host admin listener", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the service to shut down
    Stop {
        #[arg(short, long, env = "STOP_SECRET")]
        secret: String,
    },
    /// Print the Prometheus metrics exposition
    Metrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Stop { secret } => {
            let res = client
                .post(format!("{base}/stop"))
                .form(&[("secret", secret.as_str())])
                .send()
                .await?;
            match res.status() {
                StatusCode::ACCEPTED => println!("Shutdown accepted"),
                StatusCode::UNAUTHORIZED => {
                    eprintln!("Error: stop secret rejected");
                    std::process::exit(1);
                }
                status => {
                    eprintln!("Error: admin listener returned status {}", status);
                    std::process::exit(1);
                }
            }
        }
        Commands::Metrics => {
            let res = client.get(format!("{base}/metrics")).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: admin listener returned status {}", status);
        eprintln!("Response: {}", text);
        std::process::exit(1);
    }

    print!("{}", text);
    Ok(())
}
