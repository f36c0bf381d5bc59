use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use futures::future::join_all;
use hundred_days_bot::{
    api::{prometheus::PrometheusClient, ChannelId, DiscordClient, GithubClient, MessageId},
    entrypoints,
    events::{BotConfig, Context, Event},
    messages::MessageLoader,
};
use serde::Deserialize;
use shared::{
    alerts::AlertLayer, InactivitySweep, Query, Store, StreakEngine, SweepScheduler, UserId,
    UserLocks,
};
use tokio::signal;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Upper bound for every call to Discord or GitHub.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn default_sweep_hour() -> u32 {
    10
}

fn default_poll_interval() -> u64 {
    5
}

#[derive(Deserialize)]
struct Env {
    discord_token: String,
    database_url: String,
    log_channel_id: ChannelId,
    #[serde(default)]
    command_channel_ids: String,
    #[serde(default)]
    admin_ids: String,
    message_file: PathBuf,
    github_token: Option<String>,
    #[serde(default = "default_sweep_hour")]
    sweep_hour_utc: u32,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
    alert_webhook_url: Option<String>,
}

fn parse_ids(name: &str, value: &str) -> anyhow::Result<Vec<UserId>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .map_err(|e| anyhow::anyhow!("{name} contains an invalid id {id:?}: {e}"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let env = envy::from_env::<Env>()?;

    let alerts = env.alert_webhook_url.clone().map(AlertLayer::new);
    let subscriber = tracing_subscriber::registry()
        .with(alerts)
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    let config = BotConfig {
        bot_user_id: 0,
        log_channel_id: env.log_channel_id,
        command_channel_ids: parse_ids("COMMAND_CHANNEL_IDS", &env.command_channel_ids)?,
        admin_ids: parse_ids("ADMIN_IDS", &env.admin_ids)?,
    };
    if config.admin_ids.is_empty() {
        tracing::warn!("ADMIN_IDS is empty. Privileged commands are disabled");
    }

    let store = Store::connect(&env.database_url).await?;
    let locks = UserLocks::default();
    let prometheus: Arc<PrometheusClient> = Default::default();
    let discord = Arc::new(DiscordClient::new(
        &env.discord_token,
        env.log_channel_id,
        REQUEST_TIMEOUT,
        prometheus.clone(),
    )?);
    let me = discord.current_user().await?;
    info!("Logged in as {} ({})", me.username, me.id);

    let github = GithubClient::new(env.github_token, REQUEST_TIMEOUT)?;
    let messages = Arc::new(MessageLoader::load_from_file(
        &env.message_file,
        env.log_channel_id,
    )?);

    let sweep = InactivitySweep::new(
        store.clone(),
        locks.clone(),
        discord.clone(),
        messages.clone(),
        REQUEST_TIMEOUT,
    );
    let scheduler = SweepScheduler::new(Arc::new(sweep), env.sweep_hour_utc)?;

    let context = Context {
        discord,
        github: Some(Arc::new(github)),
        engine: Arc::new(StreakEngine::new(store.clone(), locks)),
        query: Arc::new(Query::new(store.clone())),
        messages,
        prometheus: prometheus.clone(),
        config: Arc::new(BotConfig {
            bot_user_id: me.id,
            ..config
        }),
    };

    let poll_interval = Duration::from_secs(env.poll_interval_secs.max(1));
    tokio::select! {
        result = run(context.clone(), poll_interval) => {
            if let Err(e) = result {
                error!("Poll loop stopped: {e:?}");
            }
        }
        _ = scheduler.run_forever(move |report, elapsed| prometheus.record_sweep(report, elapsed)) => {
            error!("Sweep scheduler stopped");
        }
        _ = signal::ctrl_c() => {
            tracing::warn!("Received SIGINT. Exiting.");
        }
        _ = rocket::build()
            .attach(entrypoints::stage())
            .manage(context)
            .launch() => {
        }
    }
    tracing::warn!("Exiting bot...");
    store.close().await;

    Ok(())
}

async fn run(context: Context, poll_interval: Duration) -> anyhow::Result<()> {
    tracing::warn!("Starting bot...");

    let mut cursors = HashMap::new();
    for channel_id in context.config.channels() {
        let latest = context.discord.latest_message_id(channel_id).await?;
        cursors.insert(channel_id, latest);
    }

    let mut interval = tokio::time::interval(poll_interval);
    loop {
        interval.tick().await;
        poll(&context, &mut cursors).await;
    }
}

/// Fetches new messages of every watched channel and handles them in id order.
#[instrument(skip_all)]
async fn poll(context: &Context, cursors: &mut HashMap<ChannelId, MessageId>) {
    let fetches = cursors.iter().map(|(&channel_id, &after)| async move {
        (
            channel_id,
            context.discord.messages_after(channel_id, after).await,
        )
    });

    let results = join_all(fetches).await;

    let mut messages = vec![];
    for (channel_id, result) in results {
        match result {
            Ok(batch) => {
                if let Some(last) = batch.last() {
                    cursors.insert(channel_id, last.id);
                }
                messages.extend(batch);
            }
            Err(e) => error!("Failed to get messages of {channel_id}: {e:?}"),
        }
    }

    if messages.is_empty() {
        return;
    }
    messages.sort_by_key(|message| message.id);
    debug!("Received {} messages", messages.len());

    for message in messages {
        let Some(event) = Event::classify(message, &context.config) else {
            continue;
        };
        if let Err(e) = event.execute(context).await {
            error!(
                "Failed to handle message {} of {}: {e:?}",
                event.message.id, event.message.author.id
            );
        }
    }
}
