use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

use smart_attendance::config::AppConfig;
use smart_attendance::database::Database;
use smart_attendance::predictions::{PredictionRunner, ScorerCommand};
use smart_attendance::{logging, routes, session, AppState};

#[actix_web::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init()?;
    tracing::debug!(?config, "loaded configuration");

    let db = Database::connect(&config.database.url)
        .await
        .with_context(|| format!("connecting to {}", config.database.url))?;

    let runner = Arc::new(PredictionRunner::new(ScorerCommand::from_config(
        &config.predictions,
    )));
    if config.predictions.enabled {
        let every = Duration::from_secs(config.predictions.interval_secs.max(1));
        tracing::info!(
            program = ?runner.command().program,
            interval = ?every,
            "scheduling dropout predictions"
        );
        Arc::clone(&runner).spawn_periodic(every);
    } else {
        tracing::info!("periodic dropout predictions disabled");
    }

    let state = web::Data::new(AppState {
        db,
        predictions: runner,
        high_risk_threshold: config.analytics.high_risk_threshold,
    });
    let key = session::session_key(config.session.secret.as_deref());
    let secure = config.session.secure_cookie;

    let addr = (config.server.host.clone(), config.server.port);
    tracing::info!("starting Smart Attendance on http://{}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        App::new()
            .wrap(session::session_middleware(key.clone(), secure))
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(&addr)
    .with_context(|| format!("binding {}:{}", addr.0, addr.1))?
    .run()
    .await?;

    Ok(())
}
