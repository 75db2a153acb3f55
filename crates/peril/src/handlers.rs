//! Subscription handlers of a player process.
//!
//! Each handler feeds one decoded event into the game actor and turns the
//! outcome into an [`AckType`]. Follow-up publishes (war declarations,
//! game logs) open their own channel; when one fails the triggering event
//! is requeued so it is retried.

use peril_broker::{Channel, Connection};
use peril_game::{GameHandle, MoveOutcome, WarOutcome};
use peril_protocol::routing::{
    EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, WAR_RECOGNITIONS_PREFIX, player_key,
};
use peril_protocol::{
    ArmyMove, BincodeCodec, Codec, GameLog, JsonCodec, PlayingState, RecognitionOfWar,
};
use peril_pubsub::{AckType, PubSubError, publish};
use serde::Serialize;

/// Applies a pause/resume signal. Always acknowledged.
pub async fn handle_pause(game: &GameHandle, signal: PlayingState) -> AckType {
    match game.apply_pause(signal).await {
        Ok(()) => AckType::Ack,
        Err(e) => {
            tracing::error!(error = %e, "pause signal not applied");
            AckType::NackRequeue
        }
    }
}

/// Applies another player's move.
///
/// A move into territory the local player holds is answered with a war
/// declaration naming the local player as defender. A move into ground
/// held by a third player is acknowledged; that player declares.
pub async fn handle_move<C: Connection>(game: &GameHandle, connection: &C, mv: ArmyMove) -> AckType {
    let attacker = mv.player.clone();
    let location = mv.to;
    match game.apply_move(mv).await {
        Ok(MoveOutcome::Safe) => AckType::Ack,
        Ok(MoveOutcome::SamePlayer) => AckType::NackDiscard,
        Ok(MoveOutcome::MakeWar { defender }) if defender != game.username() => {
            tracing::debug!(%defender, "war is for another defender to declare");
            AckType::Ack
        }
        Ok(MoveOutcome::MakeWar { .. }) => {
            let defender = match game.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::error!(error = %e, "cannot snapshot for war declaration");
                    return AckType::NackRequeue;
                }
            };
            let rw = RecognitionOfWar {
                attacker,
                defender,
                location,
            };
            let key = player_key(WAR_RECOGNITIONS_PREFIX, game.username());
            match publish_once(connection, EXCHANGE_PERIL_TOPIC, &key, &rw, &JsonCodec).await {
                Ok(()) => {
                    tracing::info!(attacker = %rw.attacker.username, %location, "war declared");
                    AckType::Ack
                }
                Err(e) => {
                    tracing::warn!(error = %e, "war declaration failed, requeueing move");
                    AckType::NackRequeue
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejected move");
            AckType::NackDiscard
        }
    }
}

/// Resolves a declared war.
///
/// A war the local player is not part of goes back to the shared queue
/// for a consumer that is. A decided war is recorded in the game log and
/// only then applied to the board, so a requeued war resolves the same
/// way on redelivery.
pub async fn handle_war<C: Connection>(
    game: &GameHandle,
    connection: &C,
    rw: RecognitionOfWar,
) -> AckType {
    let outcome = match game.war_outcome(rw.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "rejected war");
            return AckType::NackDiscard;
        }
    };

    let message = match (&outcome, outcome.log_message()) {
        (WarOutcome::NotInvolved, _) => return AckType::NackRequeue,
        (WarOutcome::NoUnits, _) | (_, None) => return AckType::NackDiscard,
        (_, Some(message)) => message,
    };

    let log = GameLog::now(game.username(), message);
    let key = player_key(GAME_LOG_SLUG, game.username());
    if let Err(e) = publish_once(connection, EXCHANGE_PERIL_TOPIC, &key, &log, &BincodeCodec).await {
        tracing::warn!(error = %e, "game log publish failed, requeueing war");
        return AckType::NackRequeue;
    }

    match game.resolve_war(rw).await {
        Ok(applied) => {
            tracing::info!(outcome = ?applied, "war resolved");
            AckType::Ack
        }
        Err(e) => {
            tracing::error!(error = %e, "war logged but not applied");
            AckType::NackRequeue
        }
    }
}

/// Publishes `value` on a fresh channel and closes the channel again.
pub(crate) async fn publish_once<C, T, K>(
    connection: &C,
    exchange: &str,
    routing_key: &str,
    value: &T,
    codec: &K,
) -> Result<(), PubSubError>
where
    C: Connection,
    T: Serialize + Sync + ?Sized,
    K: Codec,
{
    let channel = connection.create_channel().await?;
    let result = publish(&channel, exchange, routing_key, value, codec).await;
    if let Err(e) = channel.close().await {
        tracing::debug!(error = %e, "publish channel close failed");
    }
    result
}
