use anyhow::Result;
use chrono::SubsecRound;
use dotenvy::dotenv;
use log::{debug, error, info, warn};
use serenity::async_trait;
use serenity::model::channel::{Message, Reaction};
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;

use remindme::commands::{standard_registry, AccessPolicy, ActionContext, DispatchRouter};
use remindme::core::{Clock, Config, SystemClock};
use remindme::database::Database;
use remindme::delivery::{DeliveryRetrier, Messenger, RateLimitGate};
use remindme::discord::{message_event, reaction_event, DiscordTransport};
use remindme::features::{CalendarImporter, CalendarServer, HttpCalendarSource, ReminderScheduler};

struct Handler {
    router: DispatchRouter,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        self.router.handle_message(&message_event(&msg)).await;
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        match reaction_event(&reaction, self.clock.now()) {
            Some(event) => self.router.handle_reaction(&event).await,
            None => debug!("Ignoring custom emoji reaction on {}", reaction.message_id),
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🤖 Bot ID: {}", ready.user.id);
        if let Some(shard) = ready.shard {
            info!("⚡ Shard: {}/{}", shard[0] + 1, shard[1]);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting remindme...");

    let database = Database::new(&config.database_path).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gate = Arc::new(RateLimitGate::new(clock.clone()));
    let retrier = DeliveryRetrier::new(gate, config.max_concurrent_sends);

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGE_REACTIONS;

    // Outbound REST client; the bot's own id is needed before the router exists
    let http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let bot_user = http
        .get_current_user()
        .await
        .map_err(|e| {
            error!("Failed to fetch the bot user: {e}");
            error!("This could indicate an invalid bot token or network issues reaching Discord");
            anyhow::anyhow!("Bot user lookup failed: {}", e)
        })?
        .id
        .to_string();

    let transport = Arc::new(DiscordTransport::new(http.clone()));
    let messenger = Messenger::new(transport, retrier, database.clone(), clock.clone());
    let registry = Arc::new(standard_registry()?);
    let ctx = ActionContext::new(
        database.clone(),
        messenger.clone(),
        clock.clone(),
        config.base_url.clone(),
        registry,
    );
    let policy = AccessPolicy {
        bot_user,
        admin_users: config.admin_users.clone(),
        allow_new_users: config.allow_new_users,
    };
    // Discord timestamps have whole-second precision
    let router = DispatchRouter::new(ctx, policy).with_start_time(clock.now().trunc_subsecs(0));

    let handler = Handler {
        router,
        clock: clock.clone(),
    };

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    // Start the reminder scheduler
    let scheduler = ReminderScheduler::new(
        database.clone(),
        messenger,
        clock.clone(),
        config.scheduler_tick,
    );
    let runner = scheduler.clone();
    tokio::spawn(async move {
        runner.run().await;
    });

    // Start the calendar importer
    let importer = match HttpCalendarSource::new() {
        Ok(source) => {
            let importer = CalendarImporter::new(
                database.clone(),
                Arc::new(source),
                clock.clone(),
                config.import_interval,
            );
            let runner = importer.clone();
            tokio::spawn(async move {
                runner.run().await;
            });
            Some(importer)
        }
        Err(e) => {
            error!("Failed to build the calendar HTTP client: {e}. Calendar import disabled.");
            None
        }
    };

    match config.calendar_bind_addr {
        Some(addr) => {
            if let Err(e) = CalendarServer::new(database.clone()).start(addr).await {
                error!("Failed to start calendar server on {addr}: {e}. Calendar links will not work.");
            }
        }
        None => warn!("CALENDAR_BIND_ADDR not set - calendar export disabled"),
    }

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutting down...");
        scheduler.shutdown();
        if let Some(importer) = &importer {
            importer.shutdown();
        }
        shard_manager.lock().await.shutdown_all().await;
    });

    info!("Gateway intents: {intents:?}");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
