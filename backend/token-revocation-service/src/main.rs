use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use token_revocation_service::cache::RedisTokenBlacklist;
use token_revocation_service::config::Config;
use token_revocation_service::db::{self, PgRevocationLedger};
use token_revocation_service::kafka::{AlertConsumer, AlertHandler};
use token_revocation_service::metrics;
use token_revocation_service::services::{BlacklistBackfill, RevocationCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "token_revocation_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Token Revocation Service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(config = ?config, "Configuration loaded");

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;

    if config.run_migrations {
        db::MIGRATOR
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed");
    }

    let blacklist = Arc::new(
        RedisTokenBlacklist::connect(&config.redis_url)
            .await
            .context("Failed to connect to Redis")?,
    );
    info!("Redis connection established");

    let ledger = Arc::new(PgRevocationLedger::new(pool.clone()));

    if config.backfill_on_startup {
        let backfill = BlacklistBackfill::new(ledger.clone(), blacklist.clone(), config.blacklist_ttl);
        match backfill.run().await {
            Ok(restored) => info!(restored, "Blacklist backfill finished"),
            Err(e) => warn!(error = %e, "Blacklist backfill failed, continuing startup"),
        }
    }

    let coordinator = Arc::new(
        RevocationCoordinator::new(ledger, blacklist).with_ttl(config.blacklist_ttl),
    );
    let handler = AlertHandler::new(coordinator);

    let metrics_server = HttpServer::new(|| {
        App::new()
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .workers(1)
    .bind(&config.metrics_addr)
    .with_context(|| format!("Failed to bind metrics server to {}", config.metrics_addr))?
    .run();
    let metrics_handle = metrics_server.handle();
    tokio::spawn(async move {
        if let Err(e) = metrics_server.await {
            error!(error = %e, "Metrics server error");
        }
    });
    info!(addr = %config.metrics_addr, "Metrics server started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = Vec::with_capacity(config.kafka.workers);
    for worker_id in 0..config.kafka.workers {
        let mut consumer = AlertConsumer::new(
            &config.kafka,
            handler.clone(),
            shutdown_rx.clone(),
            worker_id,
        )
        .context("Failed to create Kafka consumer")?;

        workers.push(tokio::spawn(async move {
            if let Err(e) = consumer.run().await {
                error!(worker_id, error = %e, "Alert consumer exited with error");
            }
        }));
    }
    info!(workers = workers.len(), "Alert consumers started");

    shutdown_signal().await;
    info!("Shutting down, draining in-flight alerts");

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Alert consumer task panicked");
        }
    }

    metrics_handle.stop(true).await;
    pool.close().await;

    info!("Token Revocation Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
