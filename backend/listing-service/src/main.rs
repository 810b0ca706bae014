use std::sync::Arc;
use std::time::Instant;

use actix_web::{dev::Service, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use redis::aio::ConnectionManager;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listing_service::config::Config;
use listing_service::db::{self, PgLinkRepo};
use listing_service::jobs::{spawn_workers, RedisTaskQueue, TaskQueue, UpdatePropagator};
use listing_service::links::LinkCache;
use listing_service::listings::ListingService;
use listing_service::{handlers, metrics};
use ranked_cache::{RankedCache, RankedCacheStore, RedisStore};

async fn ready(store: web::Data<RedisStore>) -> HttpResponse {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().body("redis unavailable")
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},actix_web=info", config.app.log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    info!("Starting listing-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    metrics::init();

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    let repo = Arc::new(PgLinkRepo::new(pool));

    let redis_store = RedisStore::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    redis_store.ping().await.context("Redis PING failed")?;
    info!("Redis connection established");

    // BRPOP blocks its connection, so the workers pop on their own.
    let pop_client = redis::Client::open(config.redis.url.as_str())?;
    let pop_conn = Arc::new(Mutex::new(ConnectionManager::new(pop_client).await?));
    let queue: Arc<dyn TaskQueue> = Arc::new(RedisTaskQueue::new(
        redis_store.connection(),
        pop_conn,
        config.worker.queue_key.clone(),
    ));

    let store: Arc<dyn RankedCacheStore> = Arc::new(redis_store.clone());
    let cache = RankedCache::new(store.clone(), repo.clone(), (&config.cache).into());
    let propagator = Arc::new(UpdatePropagator::new(cache.clone(), repo.clone()));
    let links = Arc::new(LinkCache::new(
        store,
        repo,
        queue.clone(),
        config.cache.lock_options(),
    ));
    let service = web::Data::new(ListingService::new(
        cache,
        links,
        config.cache.strict_sort_modes,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(queue, propagator, &config.worker, shutdown_rx);
    info!(count = workers.len(), "Listing workers started");

    let redis_data = web::Data::new(redis_store);
    let bind_addr = format!("0.0.0.0:{}", config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(redis_data.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/health/ready", web::get().to(ready))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::configure)
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            metrics::observe_http_request(&method, &path, 500, start.elapsed());
                            Err(err)
                        }
                    }
                }
            })
    })
    .bind(&bind_addr)?
    .run()
    .await;

    info!("HTTP server stopped, draining workers");
    if shutdown_tx.send(true).is_err() {
        warn!("All workers already exited");
    }
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Listing worker panicked");
        }
    }

    server_result.context("HTTP server error")
}
