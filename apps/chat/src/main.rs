use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use healio_messaging::config::MessagingConfig;
use healio_messaging::feed::ConversationFeed;
use healio_messaging::store::MemoryStore;
use healio_shared::api::conversation::ConversationPatch;
use healio_shared::api::message::UserProfile;
use healio_shared::ids::ConversationId;

const USAGE: &str = "commands: /join <conversation>, /as <user-id> [name], /leave, /quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = MessagingConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let conversation_id: ConversationId = args.next().unwrap_or_else(|| "lobby".into()).parse()?;
    let user_id = args.next().unwrap_or_else(|| "local-user".into());
    let name = args.next().unwrap_or_else(|| user_id.clone());
    let mut sender = UserProfile {
        legacy_id: Some(user_id.clone()),
        name: Some(name),
        ..Default::default()
    };

    let store = Arc::new(MemoryStore::with_snapshot_buffer(config.snapshot_buffer));
    let feed = ConversationFeed::new(store, Arc::new(config.cipher()?));
    feed.bind_with_metadata(
        Some(conversation_id.clone()),
        ConversationPatch::with_participants([user_id]),
    );
    tracing::info!(conversation_id = %conversation_id, "chat ready");
    println!("{USAGE}");

    let mut updates = feed.watch();
    let printer = tokio::spawn(async move {
        let mut shown = HashSet::new();
        while updates.changed().await.is_ok() {
            let messages = updates.borrow_and_update().clone();
            if messages.is_empty() {
                shown.clear();
            }
            for message in messages {
                if shown.insert(message.id.clone()) {
                    println!(
                        "[{}] {}: {}",
                        message.created_at.format("%H:%M:%S"),
                        message.user.name,
                        message.text
                    );
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let mut words = line.split_whitespace();
        match words.next() {
            Some("/quit") => break,
            Some("/leave") => feed.unbind(),
            Some("/join") => match words.next().map(str::parse::<ConversationId>) {
                Some(Ok(id)) => feed.bind_with_metadata(
                    Some(id),
                    ConversationPatch::with_participants(sender.resolved_id().map(str::to_string)),
                ),
                _ => println!("{USAGE}"),
            },
            Some("/as") => match words.next() {
                Some(id) => {
                    sender = UserProfile {
                        legacy_id: Some(id.to_string()),
                        name: Some(words.next().unwrap_or(id).to_string()),
                        ..Default::default()
                    };
                }
                None => println!("{USAGE}"),
            },
            _ => feed.send_message(line, &sender).await,
        }
    }

    feed.unbind();
    printer.abort();
    Ok(())
}
