//! Fouls, cards, ejections and forfeits

use tracing::info;

use super::tuning::EngineConfig;
use super::world::{Card, FoulClass, MatchEventKind, MatchState, PlayerId, Team};

/// Referee: turns classified fouls into cards and ejections
pub struct DisciplineSystem;

impl DisciplineSystem {
    /// Record a foul by `offender` on `victim` and show the resulting card.
    /// Dangerous play is a straight red; anything else is a caution that
    /// becomes a red once the player reaches `cards_to_eject`.
    pub fn book(
        state: &mut MatchState,
        offender: PlayerId,
        victim: PlayerId,
        class: FoulClass,
        config: &EngineConfig,
    ) {
        let Some(player) = state.player_mut(offender) else {
            return;
        };
        let (card, ejected) = match class {
            FoulClass::DangerousPlay => (Card::Red, true),
            FoulClass::Collision | FoulClass::RecklessTackle => {
                player.cards = player.cards.saturating_add(1);
                if player.cards >= config.cards_to_eject {
                    (Card::Red, true)
                } else {
                    (Card::Yellow, false)
                }
            }
        };

        state.record(Some(offender), MatchEventKind::Foul { victim, class });
        state.record(Some(offender), MatchEventKind::Card { card, ejected });

        if ejected {
            state.remove_player(offender);
            info!(
                match_id = %state.match_id,
                tick = state.tick,
                player_id = %offender,
                ?class,
                "player sent off"
            );
        }
    }

    /// First team (home before away) left with fewer than `min_players`
    pub fn forfeiting_team(state: &MatchState, config: &EngineConfig) -> Option<Team> {
        [Team::Home, Team::Away]
            .into_iter()
            .find(|team| state.on_field_count(*team) < config.min_players)
    }
}
