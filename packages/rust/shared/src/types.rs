//! API record shapes consumed from the online-go.com REST API.
//!
//! Only the fields the renderer reads are modelled; everything else in the
//! response bodies is ignored by serde.

use serde::{Deserialize, Serialize};

/// Player identifier as used by the API.
pub type PlayerId = u64;

/// Game identifier as used by the API.
pub type GameId = u64;

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records on this page, in API order.
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// Absolute URL of the next page; absent or null on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// `{id, username}` as returned by `players` and embedded in games.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
}

/// Entry of `tournaments/{id}/players`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub player: Player,
    /// Tournament points; the API sends either a number or a numeric string.
    #[serde(default)]
    pub points: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

/// A single pairing inside a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub white: PlayerId,
    pub black: PlayerId,
    /// Missing for byes or pairings whose game has not been created yet.
    #[serde(default)]
    pub gameid: Option<GameId>,
}

impl Match {
    /// Whether `player` sits at either side of the board.
    pub fn involves(&self, player: PlayerId) -> bool {
        self.white == player || self.black == player
    }

    /// The other side of the board, if `player` is in this match.
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        if self.white == player {
            Some(self.black)
        } else if self.black == player {
            Some(self.white)
        } else {
            None
        }
    }
}

/// Entry of `tournaments/{id}/rounds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u32,
    #[serde(default)]
    pub matches: Vec<Match>,
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Body of `games/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub players: GamePlayers,
    pub gamedata: GameData,
}

/// Both sides of a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayers {
    pub white: Player,
    pub black: Player,
}

/// The subset of `gamedata` needed to describe a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameData {
    /// `"play"`, `"stone removal"`, `"finished"`, ...
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub moves: Vec<serde_json::Value>,
    #[serde(default)]
    pub winner: Option<PlayerId>,
    /// Margin or reason, e.g. `"5.5"` or `"Resignation"`.
    #[serde(default)]
    pub outcome: String,
}

impl Game {
    /// Whether `player` is one of the two sides.
    pub fn involves(&self, player: PlayerId) -> bool {
        self.players.white.id == player || self.players.black.id == player
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_next_may_be_null_or_absent() {
        let page: Page<Player> =
            serde_json::from_str(r#"{"results":[{"id":1,"username":"a"}],"next":null}"#).unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.next.is_none());

        let page: Page<Player> = serde_json::from_str(r#"{"results":[]}"#).unwrap();
        assert!(page.next.is_none());
    }

    #[test]
    fn game_parses_minimum_fields() {
        let body = r#"{
            "id": 10,
            "name": "ignored",
            "players": {
                "white": {"id": 1, "username": "A", "rank": 20},
                "black": {"id": 2, "username": "B"}
            },
            "gamedata": {"phase": "finished", "moves": [[3,3,100]], "winner": 2, "outcome": "5.5"}
        }"#;
        let game: Game = serde_json::from_str(body).unwrap();
        assert_eq!(game.players.black.username, "B");
        assert_eq!(game.gamedata.winner, Some(2));
        assert!(game.involves(1));
        assert!(!game.involves(3));
    }

    #[test]
    fn match_opponent_lookup() {
        let m = Match {
            white: 1,
            black: 2,
            gameid: Some(7),
        };
        assert_eq!(m.opponent_of(1), Some(2));
        assert_eq!(m.opponent_of(2), Some(1));
        assert_eq!(m.opponent_of(3), None);
        assert!(m.involves(2));
    }
}
