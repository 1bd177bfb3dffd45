use std::env;

const USAGE: &str = "Usage: drawdown serve [port] | drawdown project --current-age <AGE> --retirement-age <AGE> --annual-spending <AMOUNT> [flags]";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = drawdown::api::run_http_server(port).await {
                log::error!("server error: {e}");
                std::process::exit(1);
            }
        }
        Some("project") => {
            let args = std::iter::once("drawdown".to_string()).chain(raw_args[2..].iter().cloned());
            match drawdown::api::run_cli(args) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(2);
                }
            }
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}
