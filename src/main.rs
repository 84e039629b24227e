use anyhow::{bail, Context};
use appkernel::action::{ActionRequest, ActionResponse, HomePingAction};
use appkernel::app::Application;
use appkernel::args::{Args, Command};
use appkernel::config::{ConfigLoader, RuntimeMode};
use appkernel::logging::{init_logging, LoggingConfig};
use appkernel::security::{derive_token, CSRF_HEADER};
use appkernel::session::CLI_SESSION_ID;
use clap::Parser;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = match args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let settings = loader.load().context("failed to load settings")?;
    init_logging(LoggingConfig::from_settings(&settings))?;

    match args.command {
        Command::Serve { addr } => {
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid listen address '{}'", addr))?;
            let app = Arc::new(Application::bootstrap(settings, RuntimeMode::Server)?);
            eprintln!("🚀 appkernel listening on http://{}", addr);
            appkernel::server::serve(app.clone(), addr).await;
            app.shutdown()?;
        }
        Command::Check => {
            let app = Application::bootstrap(settings, RuntimeMode::Cli)?;
            let mut failed = 0;
            for (service, result) in app.check() {
                match result {
                    Ok(()) => println!("✅ {}", service),
                    Err(e) => {
                        failed += 1;
                        println!("❌ {}: {}", service, e);
                    }
                }
            }
            app.shutdown()?;
            if failed > 0 {
                bail!("{} service(s) failed to resolve", failed);
            }
        }
        Command::Ping => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            let body = if input.trim().is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(&input).context("stdin is not valid JSON")?
            };

            let app = Application::bootstrap(settings, RuntimeMode::Cli)?;
            let token = derive_token(CLI_SESSION_ID, &app.settings().csrf.salt);
            let request = ActionRequest::new("POST", "/ping")
                .with_header(CSRF_HEADER, &token)
                .with_body(body);

            match app.handle(&HomePingAction, &request, None)?.response {
                ActionResponse::Json { body, .. } => println!("{}", serde_json::to_string_pretty(&body)?),
                ActionResponse::Html { body, .. } => println!("{}", body),
            }
        }
    }

    Ok(())
}
