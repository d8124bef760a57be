use actix_web::{middleware, web, App, HttpServer};
use colorscale::acquire::Acquirer;
use colorscale::config::Settings;
use colorscale::server;
use std::{env, process};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./colorscale [config file]";

fn get_args() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        println!("{USAGE}");
        process::exit(1);
    }

    args.get(1).cloned()
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load(get_args().as_deref())?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !settings.auth_enabled() {
        info!("API_KEY is empty: /analyze-strip accepts unauthenticated requests");
    }

    let acquirer = web::Data::new(Acquirer::new(&settings)?);
    let routes = server::configure(&settings);
    let addr = settings.bind_addr();
    let settings = web::Data::new(settings);

    info!("listening on {}:{}", addr.0, addr.1);

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(acquirer.clone())
            .wrap(server::cors())
            .wrap(middleware::Logger::default())
            .configure(routes.clone())
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
