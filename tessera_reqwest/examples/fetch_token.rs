use std::time::Duration;

use clap::Parser;
use tessera::{AppId, AppSecret, LockStrategy, ManagerConfig, OutcomeExt};
use tessera_reqwest::{Client, ClientConfig};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
struct Opts {
    /// The application identifier
    #[arg(short, long, env)]
    app_id: AppId,

    /// The application secret exchanged for a token
    #[arg(short = 's', long, env, hide_env_values = true)]
    app_secret: AppSecret,

    /// The token endpoint
    #[arg(long, env, default_value = tessera_reqwest::DEFAULT_TOKEN_URL)]
    token_url: reqwest::Url,

    /// A Redis server used to share the token between processes
    #[arg(long, env)]
    redis_url: Option<String>,

    /// Whether to coordinate refreshes through a distributed lock: auto, on or off
    #[arg(long, env, default_value = "auto")]
    lock_strategy: LockStrategy,

    /// Number of concurrent requests to make
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,

    /// Abandon the requests after this many seconds
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let mut manager = ManagerConfig::new(opts.app_id, opts.app_secret)
        .with_lock_strategy(opts.lock_strategy);

    if let Some(url) = &opts.redis_url {
        let client = redis::Client::open(url.as_str())?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        manager = manager.with_redis(conn);
    }

    let client = std::sync::Arc::new(Client::new(
        ClientConfig::new(manager).with_token_url(opts.token_url),
    )?);

    tracing::info!(
        cache = ?client.manager().cache_kind(),
        distributed_lock = client.manager().has_distributed_lock(),
        "client ready"
    );

    let cx = CancellationToken::new();
    let deadline = cx.clone();
    let timeout = Duration::from_secs(opts.timeout_secs);
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        deadline.cancel();
    });

    let requests: Vec<_> = (0..opts.concurrency)
        .map(|n| {
            let client = client.clone();
            let cx = cx.clone();
            tokio::spawn(async move {
                let result = client.access_token(&cx).await;
                tracing::info!(request = n, outcome = %result.outcome(), "request finished");
                result
            })
        })
        .collect();

    for request in requests {
        match request.await? {
            Ok(token) => tracing::info!(token = format_args!("{:#?}", token), "access token"),
            Err(error) => tracing::error!(
                outcome = %error.outcome(),
                error = (&error as &dyn std::error::Error),
                "unable to obtain access token"
            ),
        }
    }

    Ok(())
}
