//! Game log aggregator: the coordinator's durable log subscriber.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use peril_broker::Connection;
use peril_protocol::GameLog;
use peril_protocol::routing::{EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, all_players_key};
use peril_pubsub::{AckType, QueueDurability, Subscription, subscribe_bincode};
use tokio::io::AsyncWriteExt;

use crate::PerilError;

/// Appends every player's game log entries to one file.
#[derive(Debug, Clone)]
pub struct GameLogAggregator {
    path: PathBuf,
}

impl GameLogAggregator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file entries are appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The line written for `entry`, without the trailing newline.
    pub fn format_line(entry: &GameLog) -> String {
        format!("[{}] {}: {}", entry.timestamp_ms, entry.username, entry.message)
    }

    /// Appends one entry, creating the file if needed.
    ///
    /// # Errors
    /// Any I/O error opening or writing the file.
    pub async fn write(&self, entry: &GameLog) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut line = Self::format_line(entry);
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Handler decision for one entry: acknowledged once written,
    /// requeued when the write fails.
    pub async fn handle(&self, entry: GameLog) -> AckType {
        match self.write(&entry).await {
            Ok(()) => {
                tracing::debug!(player = %entry.username, "game log written");
                AckType::Ack
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "game log write failed");
                AckType::NackRequeue
            }
        }
    }

    /// Subscribes to every player's log key on the shared durable
    /// `game_logs` queue.
    ///
    /// # Errors
    /// Binding or consumer registration failures.
    pub async fn start<C: Connection>(self, connection: &C) -> Result<Subscription, PerilError> {
        tracing::info!(path = %self.path.display(), "game log aggregator starting");
        let aggregator = Arc::new(self);
        let subscription = subscribe_bincode(
            connection,
            EXCHANGE_PERIL_TOPIC,
            GAME_LOG_SLUG,
            &all_players_key(GAME_LOG_SLUG),
            QueueDurability::Durable,
            move |entry: GameLog| {
                let aggregator = Arc::clone(&aggregator);
                async move { aggregator.handle(entry).await }
            },
        )
        .await?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> GameLog {
        GameLog {
            timestamp_ms: 1_700_000_000_123,
            username: "alice".into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            GameLogAggregator::format_line(&entry("alice won a war against bob")),
            "[1700000000123] alice: alice won a war against bob"
        );
    }

    #[tokio::test]
    async fn test_write_creates_file_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = GameLogAggregator::new(dir.path().join("game.log"));

        aggregator.write(&entry("first")).await.unwrap();
        aggregator.write(&entry("second")).await.unwrap();

        let contents = tokio::fs::read_to_string(aggregator.path()).await.unwrap();
        assert_eq!(
            contents,
            "[1700000000123] alice: first\n[1700000000123] alice: second\n"
        );
    }

    #[tokio::test]
    async fn test_handle_acks_on_success_and_requeues_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = GameLogAggregator::new(dir.path().join("game.log"));
        assert_eq!(good.handle(entry("ok")).await, AckType::Ack);

        let bad = GameLogAggregator::new(dir.path().join("missing").join("game.log"));
        assert_eq!(bad.handle(entry("lost")).await, AckType::NackRequeue);
    }
}
