use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use file_converter_api::artifact::{sweep_loop, ScratchDir};
use file_converter_api::{handlers, AppConfig, ConversionService, Engines};

fn load_config() -> AppConfig {
    match AppConfig::from_env().and_then(|config| config.prepare().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("FATAL: Could not load application settings. Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config();
    let (host, port) = config.bind_address();

    log::info!("🦀 Starting {} v{}", config.app_title, config.app_version);
    log::info!("📍 Listening on {}:{}", host, port);
    log::info!("📂 Scratch directory: {}", config.scratch_dir.display());
    log::info!("📄 LibreOffice: {}", config.libreoffice_path.display());
    log::info!("🔗 Routes under {}", config.conversion_scope());

    let scratch = ScratchDir::new(&config.scratch_dir);
    match scratch.sweep(config.artifact_ttl) {
        Ok(0) => {}
        Ok(count) => log::info!("🧹 Removed {} stale artifacts from a previous run", count),
        Err(e) => log::warn!("Startup sweep failed: {}", e),
    }
    actix_web::rt::spawn(sweep_loop(
        scratch.clone(),
        config.artifact_ttl,
        config.sweep_interval,
    ));

    let engines = Engines::from_config(&config);
    let service = web::Data::new(ConversionService::new(scratch, engines));
    let workers = config.workers;
    let config = web::Data::new(config);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .configure(handlers::configure(config.clone(), service.clone()))
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.bind((host, port))?.run().await
}
