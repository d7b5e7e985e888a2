//! Tournament data-tree assembler.
//!
//! Shapes raw API records into the [`Scope`] consumed by the template binder:
//!
//! ```text
//! tournamentId, tournamentHref, title, mode
//! rounds[]            roundNumber, matchCount
//!   detail (await)    groups[]
//!     players[]       username, playerHref, points
//!       games[]       color, opponent, opponentHref, gameHref, result
//! ```
//!
//! Round headers are available immediately; each round's groups arrive
//! through a deferred branch once its games have been fetched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use gobracket_client::{PaginatedFetcher, Request, Scheduler};
use gobracket_shared::{
    Game, GameId, GoBracketError, Match, Page, Participant, Player, PlayerId, Result, Round,
};
use gobracket_template::{Collection, Deferred, Scope};

/// How each round's matches are grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// Connected components of players linked by a match.
    Groups,
    /// One player and each opponent they met in the round.
    Player(String),
}

impl RenderMode {
    /// `player` query value → mode. Empty means no player selected.
    pub fn from_player(player: Option<&str>) -> Self {
        match player.map(str::trim) {
            Some(name) if !name.is_empty() => Self::Player(name.to_string()),
            _ => Self::Groups,
        }
    }
}

/// Data tree plus what the pipeline reports about it.
#[derive(Debug)]
pub struct Assembled {
    pub scope: Scope,
    pub rounds: usize,
    /// Resolved player in [`RenderMode::Player`].
    pub focus: Option<Player>,
}

/// Tournament participants by id.
type Roster = HashMap<PlayerId, Participant>;

/// `tournaments/{id}/rounds` is a bare list; accept a paginated body too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RoundsBody {
    List(Vec<Round>),
    Paged {
        results: Vec<Round>,
        #[serde(default)]
        next: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Public site URLs for players, games and tournaments.
#[derive(Debug, Clone)]
pub struct Links {
    site: String,
}

impl Links {
    pub fn new(site_url: &str) -> Self {
        Self {
            site: site_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn player(&self, id: PlayerId) -> String {
        format!("{}/player/{id}", self.site)
    }

    pub fn game(&self, id: GameId) -> String {
        format!("{}/game/{id}", self.site)
    }

    pub fn tournament(&self, id: u64) -> String {
        format!("{}/tournament/{id}", self.site)
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Builds the render data tree through a shared [`Scheduler`].
#[derive(Debug, Clone)]
pub struct Assembler {
    scheduler: Arc<Scheduler>,
    links: Links,
}

impl Assembler {
    pub fn new(scheduler: Arc<Scheduler>, site_url: &str) -> Self {
        Self {
            scheduler,
            links: Links::new(site_url),
        }
    }

    /// Assemble the data tree for `tournament`.
    ///
    /// An unknown player in [`RenderMode::Player`] yields an empty `rounds`
    /// collection rather than an error.
    #[instrument(skip(self))]
    pub async fn assemble(&self, tournament: u64, mode: &RenderMode) -> Result<Assembled> {
        let focus_name = match mode {
            RenderMode::Player(name) => Some(name.as_str()),
            RenderMode::Groups => None,
        };

        let (focus, rounds, roster) = tokio::join!(
            self.find_player(focus_name),
            self.fetch_rounds(tournament),
            self.fetch_roster(tournament),
        );
        let focus = focus?;
        let rounds = rounds?;
        let roster = Arc::new(roster.unwrap_or_else(|e| {
            warn!(error = %e, "participant list unavailable, falling back to per-player lookups");
            Roster::new()
        }));

        let rounds = match (focus_name, &focus) {
            (Some(name), None) => {
                info!(player = name, "player not found, rendering nothing");
                Vec::new()
            }
            _ => rounds,
        };

        info!(
            rounds = rounds.len(),
            participants = roster.len(),
            focus = focus.as_ref().map(|p| p.username.as_str()),
            "tournament fetched"
        );

        let round_count = rounds.len();
        let focus_id = focus.as_ref().map(|p| p.id);
        let assembler = self.clone();
        let rounds_collection = Collection::new(rounds, move |round: &Round| {
            let number = round.round_number;
            let matches = round.matches.len();
            let detail = Deferred::new(assembler.clone().round_detail(
                roster.clone(),
                round.clone(),
                focus_id,
            ));
            Scope::new()
                .leaf("roundNumber", number)
                .leaf("matchCount", matches)
                .deferred("detail", detail)
        });

        let mode_label = match &focus {
            Some(player) => format!("Games of {}", player.username),
            None if focus_name.is_some() => "Player not found".to_string(),
            None => "All groups".to_string(),
        };

        let scope = Scope::new()
            .leaf("tournamentId", tournament)
            .leaf("tournamentHref", self.links.tournament(tournament))
            .leaf("title", format!("Tournament {tournament}"))
            .leaf("mode", mode_label)
            .collection("rounds", rounds_collection);

        Ok(Assembled {
            scope,
            rounds: round_count,
            focus,
        })
    }

    /// Exact username match from the paginated player search.
    #[instrument(skip(self))]
    pub async fn find_player(&self, username: Option<&str>) -> Result<Option<Player>> {
        let Some(username) = username.filter(|name| !name.is_empty()) else {
            return Ok(None);
        };

        PaginatedFetcher::new(&self.scheduler)
            .stream::<Player>(Request::get("players").query("username", username))
            .find(|player| player.username == username)
            .await
    }

    async fn fetch_rounds(&self, tournament: u64) -> Result<Vec<Round>> {
        let body = self
            .scheduler
            .call(&Request::get(format!("tournaments/{tournament}/rounds")))
            .await?;

        match serde_json::from_value::<RoundsBody>(body) {
            Ok(RoundsBody::List(rounds)) => Ok(rounds),
            Ok(RoundsBody::Paged { results, next: None }) => Ok(results),
            Ok(RoundsBody::Paged { results, next }) => {
                PaginatedFetcher::new(&self.scheduler)
                    .resume(Page { results, next })?
                    .collect_all()
                    .await
            }
            Err(e) => Err(GoBracketError::parse(format!(
                "tournament {tournament}: unexpected rounds body: {e}"
            ))),
        }
    }

    async fn fetch_roster(&self, tournament: u64) -> Result<Roster> {
        let participants = PaginatedFetcher::new(&self.scheduler)
            .stream::<Participant>(Request::get(format!("tournaments/{tournament}/players")))
            .collect_all()
            .await?;

        Ok(participants
            .into_iter()
            .map(|participant| (participant.player.id, participant))
            .collect())
    }

    async fn fetch<T: DeserializeOwned>(&self, path: String) -> Result<T> {
        let body = self.scheduler.call(&Request::get(path.as_str())).await?;
        serde_json::from_value(body).map_err(|e| GoBracketError::parse(format!("{path}: {e}")))
    }

    /// Fetch every path concurrently, logging and skipping the ones that fail.
    async fn fetch_each<T: DeserializeOwned>(&self, paths: Vec<String>) -> Vec<T> {
        join_all(paths.into_iter().map(|path| async move {
            let fetched = self.fetch::<T>(path.clone()).await;
            (path, fetched)
        }))
        .await
        .into_iter()
        .filter_map(|(path, fetched)| match fetched {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path, error = %e, "record unavailable, skipped");
                None
            }
        })
        .collect()
    }

    /// Groups, players and games of one round.
    async fn round_detail(
        self,
        roster: Arc<Roster>,
        round: Round,
        focus: Option<PlayerId>,
    ) -> Result<Scope> {
        let groups = match focus {
            Some(player) => vec![focus_group(&round.matches, player)],
            None => connected_groups(&round.matches),
        };

        let members: HashSet<PlayerId> = groups.iter().flatten().copied().collect();
        let game_ids: Vec<GameId> = round
            .matches
            .iter()
            .filter(|m| members.contains(&m.white) || members.contains(&m.black))
            .filter_map(|m| m.gameid)
            .collect();

        let games: Vec<Game> = self
            .fetch_each(game_ids.iter().map(|id| format!("games/{id}")).collect())
            .await;

        let players = self.resolve_players(&members, &roster, &games).await;

        debug!(
            round = round.round_number,
            groups = groups.len(),
            games = games.len(),
            "round detail fetched"
        );

        let sections: Vec<Vec<PlayerSection>> = groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .filter_map(|id| players.get(&id).cloned())
                    .map(|player| PlayerSection {
                        points: roster
                            .get(&player.id)
                            .map(|p| p.points.clone())
                            .unwrap_or_default(),
                        games: games.iter().filter(|g| g.involves(player.id)).cloned().collect(),
                        player,
                    })
                    .collect()
            })
            .filter(|group: &Vec<PlayerSection>| !group.is_empty())
            .collect();

        let links = self.links.clone();
        Ok(Scope::new()
            .leaf("roundNumber", round.round_number)
            .collection(
                "groups",
                Collection::new(sections, move |group: &Vec<PlayerSection>| {
                    group_scope(&links, group)
                }),
            ))
    }

    /// Usernames from the roster, then from fetched games, then `players/{id}`.
    async fn resolve_players(
        &self,
        ids: &HashSet<PlayerId>,
        roster: &Roster,
        games: &[Game],
    ) -> HashMap<PlayerId, Player> {
        let mut known: HashMap<PlayerId, Player> = HashMap::new();
        for id in ids {
            if let Some(participant) = roster.get(id) {
                known.insert(*id, participant.player.clone());
            }
        }
        for game in games {
            for player in [&game.players.white, &game.players.black] {
                if ids.contains(&player.id) {
                    known.entry(player.id).or_insert_with(|| player.clone());
                }
            }
        }

        let missing: Vec<PlayerId> = ids
            .iter()
            .filter(|id| !known.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            debug!(count = missing.len(), "fetching players outside the roster");
            let fetched: Vec<Player> = self
                .fetch_each(missing.iter().map(|id| format!("players/{id}")).collect())
                .await;
            known.extend(fetched.into_iter().map(|player| (player.id, player)));
        }

        known
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Players linked by any match, as connected components.
///
/// Groups and their members are ordered by first appearance in `matches`.
pub fn connected_groups(matches: &[Match]) -> Vec<Vec<PlayerId>> {
    let mut order: Vec<PlayerId> = Vec::new();
    let mut index: HashMap<PlayerId, usize> = HashMap::new();
    for m in matches {
        for id in [m.white, m.black] {
            index.entry(id).or_insert_with(|| {
                order.push(id);
                order.len() - 1
            });
        }
    }

    let mut parent: Vec<usize> = (0..order.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for m in matches {
        let a = root(&mut parent, index[&m.white]);
        let b = root(&mut parent, index[&m.black]);
        if a != b {
            let (low, high) = if a < b { (a, b) } else { (b, a) };
            parent[high] = low;
        }
    }

    let mut groups: Vec<Vec<PlayerId>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for (i, id) in order.iter().enumerate() {
        let r = root(&mut parent, i);
        let g = *slot.entry(r).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(*id);
    }
    groups
}

/// `player` followed by each opponent they met, in match order.
pub fn focus_group(matches: &[Match], player: PlayerId) -> Vec<PlayerId> {
    let mut group = vec![player];
    for opponent in matches.iter().filter_map(|m| m.opponent_of(player)) {
        if !group.contains(&opponent) {
            group.push(opponent);
        }
    }
    group
}

// ---------------------------------------------------------------------------
// Scope shaping
// ---------------------------------------------------------------------------

/// One player's block inside a group.
#[derive(Debug, Clone)]
struct PlayerSection {
    player: Player,
    points: serde_json::Value,
    games: Vec<Game>,
}

fn group_scope(links: &Links, sections: &[PlayerSection]) -> Scope {
    let links = links.clone();
    Scope::new()
        .leaf("size", sections.len())
        .collection(
            "players",
            Collection::new(sections.to_vec(), move |section| section_scope(&links, section)),
        )
}

fn section_scope(links: &Links, section: &PlayerSection) -> Scope {
    let viewer = section.player.id;
    let game_links = links.clone();
    Scope::new()
        .leaf("username", section.player.username.clone())
        .leaf("playerHref", links.player(viewer))
        .leaf("points", section.points.clone())
        .collection(
            "games",
            Collection::new(section.games.clone(), move |game| {
                game_scope(&game_links, viewer, game)
            }),
        )
}

fn game_scope(links: &Links, viewer: PlayerId, game: &Game) -> Scope {
    let is_black = game.players.black.id == viewer;
    let opponent = if is_black {
        &game.players.white
    } else {
        &game.players.black
    };

    Scope::new()
        .leaf("color", if is_black { "Black" } else { "White" })
        .leaf("gameHref", links.game(game.id))
        .leaf("opponent", opponent.username.clone())
        .leaf("opponentHref", links.player(opponent.id))
        .leaf("result", result_string(game))
}

/// `"(<moves>)"` while in progress, `"B + <outcome>"` / `"W + <outcome>"` once finished.
pub fn result_string(game: &Game) -> String {
    let data = &game.gamedata;
    if data.phase != "finished" {
        return format!("({})", data.moves.len());
    }

    let winner = if data.winner == Some(game.players.black.id) {
        "B"
    } else {
        "W"
    };
    format!("{winner} + {}", data.outcome)
}
