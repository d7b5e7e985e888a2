//! End-to-end render pipeline: page params → fetch → data tree → template → HTML.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use gobracket_client::Scheduler;
use gobracket_shared::{AppConfig, DEFAULT_TOURNAMENT_ID, Player, Result, SchedulerConfig};
use gobracket_template::{BindingIssue, Template, binder};

use crate::assembler::{Assembler, RenderMode};

/// Built-in page; the app template lives in `<template id="template:app/group">`.
pub const DEFAULT_PAGE: &str = include_str!("../templates/bracket.html");

/// Id of the app template inside a page.
pub const APP_TEMPLATE_ID: &str = "template:app/group";

// ---------------------------------------------------------------------------
// Page parameters
// ---------------------------------------------------------------------------

/// The `player` / `tournament` query parameters of the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageParams {
    pub player: Option<String>,
    pub tournament: Option<u64>,
}

impl PageParams {
    /// Parse a query string such as `?player=foo&tournament=123`.
    ///
    /// A tournament value is read from its leading digits; zero or no
    /// digits counts as absent.
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut params = Self::default();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "player" => params.player = Some(value.into_owned()),
                "tournament" => params.tournament = leading_number(&value),
                _ => {}
            }
        }
        params
    }
}

fn leading_number(value: &str) -> Option<u64> {
    let digits: String = value
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|n| *n != 0)
}

// ---------------------------------------------------------------------------
// Config / result
// ---------------------------------------------------------------------------

/// Configuration for [`render_tournament`].
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub tournament: u64,
    pub mode: RenderMode,
    pub scheduler: SchedulerConfig,
    /// Public site root for links.
    pub site_url: String,
    /// Template markup; `None` uses [`DEFAULT_PAGE`].
    pub template: Option<String>,
}

impl RenderConfig {
    /// Merge page params over the loaded config.
    pub fn from_app(config: &AppConfig, params: &PageParams, template: Option<String>) -> Self {
        Self {
            tournament: params
                .tournament
                .unwrap_or(config.render.default_tournament),
            mode: RenderMode::from_player(params.player.as_deref()),
            scheduler: SchedulerConfig::from(&config.api),
            site_url: config.api.site_url.clone(),
            template,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::from_app(
            &AppConfig::default(),
            &PageParams {
                player: None,
                tournament: Some(DEFAULT_TOURNAMENT_ID),
            },
            None,
        )
    }
}

/// Result of a completed render.
#[derive(Debug)]
pub struct RenderResult {
    /// Final page HTML.
    pub html: String,
    /// Rounds rendered.
    pub rounds: usize,
    /// Deferred branches settled after the initial paint.
    pub branches_settled: usize,
    /// Binding steps skipped (missing keys, failed branches).
    pub issues: Vec<BindingIssue>,
    /// Resolved player in player mode.
    pub focus: Option<Player>,
    /// Highest number of concurrent API requests observed.
    pub peak_requests: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting render status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called with the full page after the initial paint and after every settled branch.
    fn painted(&self, html: &str);
    /// Called when a deferred branch settles.
    fn branch_settled(&self, key: &str, settled: usize, remaining: usize);
    /// Called when the render completes.
    fn done(&self, result: &RenderResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn painted(&self, _html: &str) {}
    fn branch_settled(&self, _key: &str, _settled: usize, _remaining: usize) {}
    fn done(&self, _result: &RenderResult) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Load a template from markup: the app `<template>` of a page if present,
/// otherwise the whole markup as a fragment.
pub fn load_template(markup: &str) -> Result<Template> {
    if markup.contains(APP_TEMPLATE_ID) {
        Template::from_page(markup, APP_TEMPLATE_ID)
    } else {
        Template::parse(markup)
    }
}

/// Run the full render.
///
/// 1. Parse the template
/// 2. Fetch rounds, participants and (in player mode) the player
/// 3. Initial paint: header and round sections
/// 4. Settle each round's deferred groups as its games arrive
#[instrument(skip_all, fields(tournament = config.tournament, mode = ?config.mode))]
pub async fn render_tournament(
    config: &RenderConfig,
    progress: &dyn ProgressReporter,
) -> Result<RenderResult> {
    let start = Instant::now();

    progress.phase("Loading template");
    let template = load_template(config.template.as_deref().unwrap_or(DEFAULT_PAGE))?;

    progress.phase("Fetching tournament");
    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone())?);
    let assembler = Assembler::new(scheduler.clone(), &config.site_url);
    let assembled = assembler.assemble(config.tournament, &config.mode).await?;

    let title = format!("Tournament {}", config.tournament);
    let mut render = binder::fill(&template, assembled.scope);
    progress.painted(&wrap_page(&title, &render.document().to_html()));

    progress.phase("Fetching games");
    let mut settled = 0;
    while let Some(update) = render.next_update().await {
        settled += 1;
        progress.branch_settled(&update.key, settled, render.pending());
        progress.painted(&wrap_page(&title, &render.document().to_html()));
    }

    let issues = render.issues().to_vec();
    if !issues.is_empty() {
        warn!(issues = issues.len(), "render completed with skipped bindings");
    }

    let html = wrap_page(&title, &render.into_document().to_html());
    let result = RenderResult {
        html,
        rounds: assembled.rounds,
        branches_settled: settled,
        issues,
        focus: assembled.focus,
        peak_requests: scheduler.high_water(),
        elapsed: start.elapsed(),
    };

    info!(
        rounds = result.rounds,
        branches = result.branches_settled,
        issues = result.issues.len(),
        peak_requests = result.peak_requests,
        duration_ms = result.elapsed.as_millis() as u64,
        "render completed"
    );

    progress.done(&result);
    Ok(result)
}

/// Wrap a rendered fragment in a minimal HTML page.
pub fn wrap_page(title: &str, body: &str) -> String {
    let title = title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer, params: PageParams) -> RenderConfig {
        let mut app = AppConfig::default();
        app.api.base_url = format!("{}/api/v1", server.uri());
        app.api.poll_interval_ms = 5;
        app.api.backoff_unit_ms = 5;
        RenderConfig::from_app(&app, &params, None)
    }

    fn player(id: u64, username: &str) -> serde_json::Value {
        json!({"id": id, "username": username})
    }

    async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// Tournament 1: one round, A(1)–B(2) finished B+5.5, C(3)–D(4) in progress after 7 moves.
    async fn tournament_server() -> MockServer {
        let server = MockServer::start().await;

        mount_json(
            &server,
            "/api/v1/tournaments/1/rounds",
            json!([{
                "round_number": 1,
                "matches": [
                    {"white": 1, "black": 2, "gameid": 100},
                    {"white": 3, "black": 4, "gameid": 101}
                ]
            }]),
        )
        .await;

        mount_json(
            &server,
            "/api/v1/tournaments/1/players",
            json!({
                "results": [
                    {"player": player(1, "A"), "points": 1},
                    {"player": player(2, "B"), "points": "2"},
                    {"player": player(3, "C"), "points": 0},
                    {"player": player(4, "D"), "points": 0}
                ],
                "next": null
            }),
        )
        .await;

        mount_json(
            &server,
            "/api/v1/games/100",
            json!({
                "id": 100,
                "players": {"white": player(1, "A"), "black": player(2, "B")},
                "gamedata": {"phase": "finished", "moves": [[1,1,0], [2,2,0]], "winner": 2, "outcome": "5.5"}
            }),
        )
        .await;

        mount_json(
            &server,
            "/api/v1/games/101",
            json!({
                "id": 101,
                "players": {"white": player(3, "C"), "black": player(4, "D")},
                "gamedata": {"phase": "play", "moves": [[0,0,0],[0,1,0],[0,2,0],[0,3,0],[0,4,0],[0,5,0],[0,6,0]]}
            }),
        )
        .await;

        server
    }

    #[test]
    fn page_params_from_query() {
        let params = PageParams::from_query("?player=go%20fan&tournament=123abc");
        assert_eq!(params.player.as_deref(), Some("go fan"));
        assert_eq!(params.tournament, Some(123));

        assert_eq!(PageParams::from_query("tournament=x").tournament, None);
        assert_eq!(PageParams::from_query("tournament=0").tournament, None);
        assert_eq!(PageParams::from_query(""), PageParams::default());
    }

    #[test]
    fn render_config_defaults_to_fixed_tournament() {
        let config = RenderConfig::from_app(&AppConfig::default(), &PageParams::default(), None);
        assert_eq!(config.tournament, 59567);
        assert_eq!(config.mode, RenderMode::Groups);
    }

    #[test]
    fn default_page_template_loads() {
        let template = load_template(DEFAULT_PAGE).unwrap();
        assert!(!template.fragment().nodes.is_empty());
    }

    #[tokio::test]
    async fn renders_groups_with_result_strings() {
        let server = tournament_server().await;
        let config = test_config(
            &server,
            PageParams {
                player: None,
                tournament: Some(1),
            },
        );

        let result = render_tournament(&config, &SilentProgress).await.unwrap();

        assert_eq!(result.rounds, 1);
        assert_eq!(result.branches_settled, 1);
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.html.contains(">B + 5.5</a>"));
        assert!(result.html.contains(">(7)</a>"));
        assert!(result.html.contains(r#"href="https://online-go.com/game/100""#));
        assert!(result.html.contains(r#"data-round="1""#));
        assert!(result.html.contains("All groups"));
        // Two groups of two players, each player listing their one game.
        assert_eq!(result.html.matches(r#"class="group""#).count(), 2);
        assert_eq!(result.html.matches(r#"class="result""#).count(), 4);
        assert!(result.peak_requests <= 10);
    }

    #[tokio::test]
    async fn player_mode_fetches_only_their_games() {
        let server = tournament_server().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/players"))
            .and(query_param("username", "A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [player(11, "AA"), player(1, "A")],
                "next": null
            })))
            .mount(&server)
            .await;

        let config = test_config(
            &server,
            PageParams {
                player: Some("A".into()),
                tournament: Some(1),
            },
        );

        let result = render_tournament(&config, &SilentProgress).await.unwrap();

        assert_eq!(result.focus.as_ref().map(|p| p.id), Some(1));
        assert!(result.html.contains("Games of A"));
        assert!(result.html.contains(">B + 5.5</a>"));
        assert!(!result.html.contains("(7)"));

        let requests = server.received_requests().await.unwrap();
        assert!(!requests.iter().any(|r| r.url.path() == "/api/v1/games/101"));
    }

    #[tokio::test]
    async fn unknown_player_renders_no_rounds() {
        let server = tournament_server().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/players"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [player(5, "Alpha")],
                "next": null
            })))
            .mount(&server)
            .await;

        let config = test_config(
            &server,
            PageParams {
                player: Some("Alp".into()),
                tournament: Some(1),
            },
        );

        let result = render_tournament(&config, &SilentProgress).await.unwrap();

        assert_eq!(result.rounds, 0);
        assert!(result.focus.is_none());
        assert!(!result.html.contains("Round"));
        assert!(result.html.contains("Player not found"));
    }

    #[tokio::test]
    async fn unavailable_game_is_skipped_and_round_still_renders() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/api/v1/tournaments/2/rounds",
            json!([{"round_number": 1, "matches": [
                {"white": 1, "black": 2, "gameid": 500},
                {"white": 3, "black": 4, "gameid": 501}
            ]}]),
        )
        .await;
        mount_json(
            &server,
            "/api/v1/tournaments/2/players",
            json!({"results": [
                {"player": player(1, "A"), "points": 0},
                {"player": player(2, "B"), "points": 0},
                {"player": player(3, "C"), "points": 0},
                {"player": player(4, "D"), "points": 0}
            ], "next": null}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/games/500"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
            .mount(&server)
            .await;
        mount_json(
            &server,
            "/api/v1/games/501",
            json!({
                "id": 501,
                "players": {"white": player(3, "C"), "black": player(4, "D")},
                "gamedata": {"phase": "finished", "moves": [], "winner": 3, "outcome": "Resignation"}
            }),
        )
        .await;

        let config = test_config(
            &server,
            PageParams {
                player: None,
                tournament: Some(2),
            },
        );

        let result = render_tournament(&config, &SilentProgress).await.unwrap();

        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.html.contains("Round <span>1</span>"));
        assert_eq!(result.html.matches(r#"class="group""#).count(), 2);
        assert_eq!(result.html.matches(r#"class="result""#).count(), 2);
        assert!(result.html.contains(">W + Resignation</a>"));
        assert!(!result.html.contains("/game/500"));
    }

    #[tokio::test]
    async fn paginated_rounds_fetch_each_page_once() {
        let server = MockServer::start().await;
        let next = format!("{}/api/v1/tournaments/3/rounds?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/api/v1/tournaments/3/rounds"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"round_number": 2, "matches": []}],
                "next": null
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tournaments/3/rounds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"round_number": 1, "matches": []}],
                "next": next
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_json(
            &server,
            "/api/v1/tournaments/3/players",
            json!({"results": [], "next": null}),
        )
        .await;

        let config = test_config(
            &server,
            PageParams {
                player: None,
                tournament: Some(3),
            },
        );

        let result = render_tournament(&config, &SilentProgress).await.unwrap();

        assert_eq!(result.rounds, 2);
        assert!(result.html.contains(r#"data-round="1""#));
        assert!(result.html.contains(r#"data-round="2""#));
        let rounds_requests = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/v1/tournaments/3/rounds")
            .count();
        assert_eq!(rounds_requests, 2);
    }

    #[tokio::test]
    async fn progress_sees_initial_paint_before_games() {
        struct Recorder(Mutex<Vec<String>>);

        impl ProgressReporter for Recorder {
            fn phase(&self, _name: &str) {}
            fn painted(&self, html: &str) {
                self.0.lock().unwrap().push(html.to_string());
            }
            fn branch_settled(&self, _key: &str, _settled: usize, _remaining: usize) {}
            fn done(&self, _result: &RenderResult) {}
        }

        let server = tournament_server().await;
        let config = test_config(
            &server,
            PageParams {
                player: None,
                tournament: Some(1),
            },
        );
        let recorder = Recorder(Mutex::new(Vec::new()));

        render_tournament(&config, &recorder).await.unwrap();

        let paints = recorder.0.into_inner().unwrap();
        assert_eq!(paints.len(), 2);
        assert!(paints[0].contains("Round <span>1</span>"));
        assert!(!paints[0].contains("B + 5.5"));
        assert!(paints[1].contains("B + 5.5"));
    }
}
