use std::sync::Arc;
use axum::{
    routing::{Router, get},
    http::{Method, HeaderValue},
    middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    compression::CompressionLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::{info, warn, error};
use tokio::time::Duration;

mod routes;
mod models;
mod services;
mod config;
mod error;
mod utils;
mod state;

use crate::{
    config::Config,
    state::AppState,
    services::{
        boost::SurrealBoostStore,
        geo::SurrealProximityIndex,
        push::{PushSender, WebPushSender},
        AlertService,
        AuthService,
        BoostService,
        BoostSweeper,
        Database,
        FeedService,
        NotificationDispatcher,
        NotificationService,
        SubscriberService,
    },
    utils::cache::build_feed_cache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "rainbow_paws=debug,tower_http=debug".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rainbow-Paws service...");

    // 加载配置
    dotenv::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    // 初始化数据库连接
    let db = Arc::new(match Database::new(&config).await {
        Ok(db) => {
            match db.verify_connection().await {
                Ok(_) => {
                    info!("Database connection established successfully");
                    db
                }
                Err(e) => {
                    warn!("Database connection failed: {}", e);
                    info!("Attempting to auto-start database...");

                    // 尝试自动启动数据库
                    if let Err(start_err) = auto_start_database(&config).await {
                        error!("Failed to auto-start database: {}. Original error: {}", start_err, e);
                        return Err(anyhow::anyhow!("Database connection failed"));
                    }

                    // 重新尝试连接
                    let db = Database::new(&config).await?;
                    db.verify_connection().await?;
                    info!("Database auto-started and connected successfully");
                    db
                }
            }
        }
        Err(e) => {
            error!("Failed to create database connection: {}", e);
            return Err(anyhow::anyhow!("Database initialization failed"));
        }
    });

    // 初始化所有服务
    let auth_service = AuthService::new(&config).await?;
    let feed_cache = build_feed_cache(config.redis_url.as_deref()).await;
    let notification_service = Arc::new(NotificationService::new(db.clone()).await?);

    let push_sender: Arc<dyn PushSender> = Arc::new(WebPushSender::new(&config)?);
    let dispatcher = NotificationDispatcher::new(
        notification_service.clone(),
        push_sender,
        config.fanout_concurrency,
    );

    let subscriber_service = Arc::new(SubscriberService::new(db.clone(), config.clone()));
    let proximity_index = Arc::new(SurrealProximityIndex::new(db.clone()));
    let alert_service = AlertService::new(
        db.clone(),
        proximity_index,
        dispatcher.clone(),
        subscriber_service.clone(),
        config.frontend_url.clone(),
    );

    let boost_store = Arc::new(SurrealBoostStore::new(db.clone()));
    let boost_service = BoostService::new(
        boost_store.clone(),
        feed_cache.clone(),
        dispatcher.clone(),
        subscriber_service.clone(),
    );
    let feed_service = FeedService::new(db.clone(), feed_cache.clone(), config.clone());

    // 创建应用状态
    let app_state = Arc::new(AppState {
        config: config.clone(),
        auth_service,
        subscriber_service,
        notification_service,
        alert_service,
        boost_service,
        feed_service,
    });

    // 启动后台任务
    let sweeper = BoostSweeper::new(boost_store, feed_cache, config.clone());
    sweeper.spawn();

    // 配置 CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(
            config.cors_allowed_origins
                .split(',')
                .map(|origin| origin.parse::<HeaderValue>().unwrap())
                .collect::<Vec<_>>(),
        );

    // 构建应用路由 - 使用/api/paws/前缀避免网关路由冲突
    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api/paws/users", routes::users::router())
        .nest("/api/paws/lost-cats", routes::lost_cats::router())
        .nest("/api/paws/posts", routes::posts::router())
        .nest("/api/paws/boosts", routes::boosts::router())
        .nest("/api/paws/notifications", routes::notifications::router())
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            utils::middleware::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            utils::middleware::rate_limit_middleware,
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // 启动主服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "Rainbow-Paws is running!"
}

async fn auto_start_database(config: &Config) -> anyhow::Result<()> {
    info!("Attempting to start SurrealDB...");

    // 尝试启动 SurrealDB 进程
    let output = tokio::process::Command::new("surreal")
        .args(&[
            "start",
            "--user", &config.database_username,
            "--pass", &config.database_password,
            "memory",
        ])
        .spawn();

    match output {
        Ok(_) => {
            info!("SurrealDB started successfully");
            // 等待数据库启动
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(())
        }
        Err(e) => {
            error!("Failed to start SurrealDB: {}", e);
            Err(anyhow::anyhow!("Failed to start database"))
        }
    }
}
