mod config;
mod error;
mod inference;
mod model;
mod routes;
#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use config::ServiceConfig;
use model::ModelContext;
use routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load service configuration: {}", e);
            return Err(std::io::Error::other(format!("Configuration failed: {}", e)));
        }
    };

    std::fs::create_dir_all(&config.server.upload_dir)?;
    log::info!("Uploads are written to {}", config.server.upload_dir.display());

    let context = match ModelContext::load(&config) {
        Ok(context) => web::Data::new(context),
        Err(e) => {
            log::error!("Failed to preload models at startup: {}", e);
            return Err(std::io::Error::other(format!("Model loading failed: {}", e)));
        }
    };

    let body_limit = config.server.max_body_bytes;
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(context.clone())
            .configure(configure_routes(body_limit))
    })
    .bind(&bind_address)?
    .run()
    .await
}
