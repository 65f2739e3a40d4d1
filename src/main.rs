use std::sync::Arc;

use teloxide::{
    dispatching::dialogue::{serializer::Bincode, InMemStorage, RedisStorage, Storage},
    prelude::*,
    utils::command::BotCommands,
};

mod config;
mod flow;
mod funcs;
mod functions;
mod misc;
mod texts;

use config::ConfigParameters;
use funcs::{MemStore, MongoStore, SharedStore};
use functions::DialogueStorage;
use misc::{Command, State};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    dotenv::from_filename(".env.local").ok();
    pretty_env_logger::init();
    log::info!("Starting bot..");
    if let Err(e) = run().await {
        log::error!("Bot stopped: {e}");
        std::process::exit(1);
    }
}

async fn open_store(cfg: &ConfigParameters) -> Result<SharedStore, BoxError> {
    match &cfg.mongodb_uri {
        Some(uri) => Ok(Arc::new(MongoStore::connect(uri, &cfg.database).await?)),
        None => {
            log::warn!("MONGODB_URI is not set, identities are kept in memory only");
            Ok(Arc::new(MemStore::new()))
        }
    }
}

async fn open_dialogues(cfg: &ConfigParameters) -> Result<Arc<DialogueStorage>, BoxError> {
    match &cfg.redis_url {
        Some(url) => {
            log::info!("Keeping dialogue states in Redis");
            Ok(RedisStorage::open(url.as_str(), Bincode).await?.erase())
        }
        None => Ok(InMemStorage::<State>::new().erase()),
    }
}

async fn run() -> Result<(), BoxError> {
    let cfg = ConfigParameters::from_env()?;
    let store = open_store(&cfg).await?;
    let dialogues = open_dialogues(&cfg).await?;

    let bot = Bot::from_env();
    bot.set_my_commands(Command::bot_commands()).await?;

    Dispatcher::builder(bot, functions::schema())
        .dependencies(dptree::deps![store, dialogues])
        .default_handler(|upd| async move {
            log::warn!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}
