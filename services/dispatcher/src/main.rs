use std::time::Duration;

use clap::{Parser, Subcommand};
use sea_orm::Database;
use tracing::info;

use yodel_core::config::load_env_files;
use yodel_core::tracing::init_tracing;
use yodel_dispatcher::config::{DispatcherConfig, PushMode};
use yodel_dispatcher::infra::apns::{ApnsClient, ApnsSettings, ChannelFeedbackSource};
use yodel_dispatcher::infra::events::EventPublisher;
use yodel_dispatcher::infra::fcm::FcmClient;
use yodel_dispatcher::infra::providers::{ApnsProvider, FcmProvider};
use yodel_dispatcher::infra::queue::RedisCommandQueue;
use yodel_dispatcher::infra::recording::RecordingProvider;
use yodel_dispatcher::listener::{QueueListener, default_bindings};
use yodel_dispatcher::ping::LivenessProbe;
use yodel_dispatcher::router::build_router;
use yodel_dispatcher::state::{ApiState, AppState};
use yodel_dispatcher::supervisor::{WorkerCommand, WorkerPool};

#[derive(Parser)]
#[command(name = "yodel", about = "Push-notification dispatch gateway")]
struct Args {
    /// Environment name; selects `.env.<environment>`
    #[arg(short, long, default_value = "development", global = true)]
    environment: String,

    /// Worker processes to supervise (default: available CPUs)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Mode {
    /// Keep a pool of workers alive and run the liveness probe
    #[default]
    Supervise,
    /// Drain the command queues
    Worker,
    /// Serve the HTTP enqueue API
    Serve,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    load_env_files(&args.environment);
    let _tracing = init_tracing();

    let config = DispatcherConfig::from_env();
    match args.mode.unwrap_or_default() {
        Mode::Supervise => supervise(&args, &config).await,
        Mode::Worker => work(&config).await,
        Mode::Serve => serve(&config).await,
    }
}

async fn supervise(args: &Args, config: &DispatcherConfig) {
    let size = args.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    });

    if let Some(targets) = config.ping.clone() {
        let db = Database::connect(&config.database_url)
            .await
            .expect("failed to connect to database");
        let probe = LivenessProbe {
            devices: yodel_dispatcher::infra::db::DbDeviceRepository { db },
            queue: redis_queue(&config.redis_url),
            http: http_client(),
            targets,
        };
        tokio::spawn(async move { probe.run().await });
        info!("liveness probe enabled");
    }

    let launcher =
        WorkerCommand::current(&args.environment).expect("failed to resolve current executable");
    WorkerPool::new(launcher, size).run().await;
}

async fn work(config: &DispatcherConfig) {
    let (state, feedback) = connect(config).await;
    let gateway = state.gateway();

    if let Some(source) = feedback {
        let reconciler = gateway.feedback();
        tokio::spawn(async move { reconciler.run(source).await });
        info!("feedback reconciler enabled");
    }

    let listener = QueueListener::new(state.queue(), gateway, default_bindings())
        .expect("invalid queue bindings");
    info!(pid = std::process::id(), "worker started");
    listener.listen().await;
}

async fn serve(config: &DispatcherConfig) {
    let queue = redis_queue(&config.redis_url);
    let router = build_router(ApiState { queue });

    let addr = format!("0.0.0.0:{}", config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");
    info!("enqueue api listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}

async fn connect(config: &DispatcherConfig) -> (AppState, Option<ChannelFeedbackSource>) {
    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let queue = redis_queue(&config.redis_url).with_block_timeout(config.queue_block_timeout);
    let events = match &config.redis_events_url {
        Some(url) => EventPublisher::Redis(redis_pool(url)),
        None => EventPublisher::Log,
    };
    let http = http_client();

    let recorder = RecordingProvider {
        queue: queue.clone(),
    };
    let mut feedback = None;
    let (apns, fcm) = match config.push_mode {
        PushMode::Recording => (
            ApnsProvider::Recording(recorder.clone()),
            FcmProvider::Recording(recorder),
        ),
        PushMode::Live => {
            let apns = match &config.apns {
                Some(apns) => {
                    let client = ApnsClient::new(
                        http.clone(),
                        ApnsSettings {
                            key_pem: std::fs::read(&apns.key_path)
                                .expect("failed to read APN_KEY_PATH"),
                            key_id: apns.key_id.clone(),
                            team_id: apns.team_id.clone(),
                            topic: apns.topic.clone(),
                            production: apns.production,
                        },
                    )
                    .expect("invalid APNs configuration");
                    let client = if config.apns_feedback {
                        let (client, source) = client.with_feedback();
                        feedback = Some(source);
                        client
                    } else {
                        client
                    };
                    ApnsProvider::Live(client)
                }
                None => ApnsProvider::Disabled,
            };
            let fcm = match &config.fcm {
                Some(settings) => FcmProvider::Live(FcmClient::new(http, settings.clone())),
                None => FcmProvider::Disabled,
            };
            (apns, fcm)
        }
    };

    let state = AppState {
        db,
        queue,
        events,
        apns,
        fcm,
    };
    (state, feedback)
}

fn redis_queue(url: &str) -> RedisCommandQueue {
    RedisCommandQueue::open(url).expect("invalid REDIS_URL")
}

fn redis_pool(url: &str) -> deadpool_redis::Pool {
    deadpool_redis::Config::from_url(url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool")
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
}
