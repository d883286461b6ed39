use std::env;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = fundsim::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("tax") => {
            let Some(income) = raw_args.get(2).and_then(|s| s.parse::<f64>().ok()) else {
                eprintln!("Usage: fundsim tax <income>");
                std::process::exit(1);
            };
            println!(
                "Income: {income:.2}, Tax: {:.2}",
                fundsim::core::uk_income_tax(income)
            );
        }
        _ => {
            if let Err(e) = fundsim::api::run_cli(raw_args) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}
