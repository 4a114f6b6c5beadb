use std::cell::RefCell;
use std::path::{Path, PathBuf};

use chess_etl::{
    parse_games_response, run_pipeline, ApiError, GameSource, MonthKey, PipelineConfig,
    PipelineError, PlayerProfile, RawGamePayload, RunLog, RunOptions, Warehouse, WarehouseQuery,
    DEFAULT_RUN_LOG_TABLE,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

const JAN: &[u8] = include_bytes!("fixtures/games_2023_01.json");
const FEB: &[u8] = include_bytes!("fixtures/games_2023_02.json");
const PROFILE: &[u8] = include_bytes!("fixtures/profile_tracked_user.json");

#[derive(Default)]
struct FixtureSource {
    fail_games: bool,
    months: RefCell<Vec<MonthKey>>,
}

impl GameSource for FixtureSource {
    fn fetch_games(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<RawGamePayload>, ApiError> {
        if self.fail_games {
            return Err(ApiError::HttpStatus {
                url: "fixture".to_string(),
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        self.months.borrow_mut().push(month);
        let payloads = match (month.year, month.month) {
            (2023, 1) => parse_games_response("jan", JAN)?,
            (2023, 2) => parse_games_response("feb", FEB)?,
            _ => Vec::new(),
        };
        Ok(payloads
            .into_iter()
            .filter(|p| {
                p.white.username.eq_ignore_ascii_case(username)
                    || p.black.username.eq_ignore_ascii_case(username)
            })
            .collect())
    }

    fn fetch_profile(&self, _username: &str) -> Result<PlayerProfile, ApiError> {
        serde_json::from_slice(PROFILE).map_err(|err| ApiError::Decode {
            url: "fixture".to_string(),
            message: err.to_string(),
        })
    }
}

fn manifest_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn config_for(db: &Path) -> PipelineConfig {
    config_with(db, &["tracked_user"], "2023-01-15")
}

fn config_with(db: &Path, usernames: &[&str], start_date: &str) -> PipelineConfig {
    let yaml = format!(
        r#"
name: chess_test
database_path: {db}
eco_codes_path: {eco}
transform_template_path: {sql}
chunk_size: 2
games:
  usernames: [{users}]
  start_date: {start_date}
  end_date: 2023-02-10
"#,
        db = db.display(),
        eco = manifest_path("tests/fixtures/eco_codes.csv").display(),
        sql = manifest_path("sql/transform").display(),
        users = usernames.join(", "),
    );
    PipelineConfig::from_yaml_str(&yaml).expect("test config should parse")
}

fn games_per_user(db: &Path) -> Vec<(String, i64)> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare("SELECT username, count(*) FROM games GROUP BY username ORDER BY username")
        .unwrap();
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

fn at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 2, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn run_statuses(db: &Path, pipeline: &str) -> Vec<(i64, String)> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT run_id, status FROM {DEFAULT_RUN_LOG_TABLE} WHERE pipeline_name = ?1 ORDER BY rowid"
        ))
        .unwrap();
    let rows = stmt
        .query_map([pipeline], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

#[test]
fn full_run_loads_games_players_and_derived_tables() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chess.db");
    let cfg = config_for(&db);
    let source = FixtureSource::default();

    let summary = run_pipeline(&cfg, &source, RunOptions::default(), None, at(15)).unwrap();

    assert_eq!(summary.run_id, 1);
    assert_eq!(summary.games_loaded, 2);
    assert_eq!(summary.players_loaded, 1);
    assert_eq!(summary.transforms.len(), 4);

    let warehouse = Warehouse::open(&db).unwrap();
    assert_eq!(warehouse.count_rows("games").unwrap(), 2);
    assert_eq!(warehouse.count_rows("players").unwrap(), 1);
    assert!(warehouse.table_exists("overall_performance").unwrap());

    assert_eq!(
        run_statuses(&db, "chess_test"),
        vec![(1, "start".to_string()), (1, "success".to_string())]
    );
}

#[test]
fn second_run_is_incremental_and_upserts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chess.db");
    let cfg = config_for(&db);

    run_pipeline(&cfg, &FixtureSource::default(), RunOptions::default(), None, at(15)).unwrap();

    let source = FixtureSource::default();
    let summary = run_pipeline(&cfg, &source, RunOptions::default(), None, at(16)).unwrap();

    assert_eq!(summary.run_id, 2);
    // newest game is 2023-02-03, so only February is re-read
    assert_eq!(*source.months.borrow(), vec![MonthKey { year: 2023, month: 2 }]);
    assert_eq!(summary.games_loaded, 1);

    let warehouse = Warehouse::open(&db).unwrap();
    assert_eq!(warehouse.count_rows("games").unwrap(), 2);
    assert_eq!(warehouse.count_rows("players").unwrap(), 2, "one snapshot per run");
}

#[test]
fn failures_are_recorded_in_the_run_log_and_returned() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chess.db");
    let cfg = config_for(&db);
    let source = FixtureSource {
        fail_games: true,
        ..FixtureSource::default()
    };

    let err = run_pipeline(&cfg, &source, RunOptions::default(), None, at(15)).unwrap_err();
    assert!(matches!(err, PipelineError::Extract(_)));

    let conn = Connection::open(&db).unwrap();
    let log = RunLog::begin(&conn, DEFAULT_RUN_LOG_TABLE, "chess_test", &serde_json::json!({}))
        .unwrap();
    let entries = log.entries(&conn).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].status, "fail");
    assert!(entries[1]
        .logs
        .as_deref()
        .unwrap_or_default()
        .contains("503"));
    assert_eq!(log.run_id(), 2, "next run gets a fresh id");
}

#[test]
fn skip_flags_limit_the_stages() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chess.db");
    let cfg = config_for(&db);
    let source = FixtureSource::default();

    let summary = run_pipeline(
        &cfg,
        &source,
        RunOptions {
            skip_games: false,
            skip_players: true,
            skip_transforms: true,
        },
        None,
        at(15),
    )
    .unwrap();

    assert_eq!(summary.games_loaded, 2);
    assert_eq!(summary.players_loaded, 0);
    assert!(summary.transforms.is_empty());
    let warehouse = Warehouse::open(&db).unwrap();
    assert!(!warehouse.table_exists("players").unwrap());
    assert!(!warehouse.table_exists("performance").unwrap());
}

#[test]
fn invalid_config_fails_before_touching_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("never.db");
    let mut cfg = config_for(&db);
    cfg.games.load_method = "merge".to_string();

    let err =
        run_pipeline(&cfg, &FixtureSource::default(), RunOptions::default(), None, at(15))
            .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(!db.exists());
}

#[test]
fn tracked_users_who_played_each_other_keep_one_row_each() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chess.db");
    let cfg = config_with(&db, &["tracked_user", "rival_one"], "2023-01-01");
    let options = RunOptions {
        skip_players: true,
        ..RunOptions::default()
    };

    let summary = run_pipeline(&cfg, &FixtureSource::default(), options, None, at(15)).unwrap();
    assert_eq!(summary.games_loaded, 5);
    assert_eq!(
        games_per_user(&db),
        vec![("rival_one".to_string(), 2), ("tracked_user".to_string(), 3)]
    );

    let conn = Connection::open(&db).unwrap();
    let mut stmt = conn
        .prepare("SELECT username, user_color FROM games WHERE game_id = ?1 ORDER BY username")
        .unwrap();
    let sides: Vec<(String, String)> = stmt
        .query_map([70_000_000_001_i64], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        sides,
        vec![
            ("rival_one".to_string(), "black".to_string()),
            ("tracked_user".to_string(), "white".to_string()),
        ]
    );

    // a rerun upserts both users' rows in place
    run_pipeline(&cfg, &FixtureSource::default(), options, None, at(16)).unwrap();
    assert_eq!(games_per_user(&db).iter().map(|(_, n)| n).sum::<i64>(), 5);
}

#[test]
fn black_side_wins_count_as_wins_in_performance() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chess.db");
    let cfg = config_with(&db, &["tracked_user"], "2023-01-01");

    run_pipeline(&cfg, &FixtureSource::default(), RunOptions::default(), None, at(15)).unwrap();

    let conn = Connection::open(&db).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT game_mode, games_played, wins, defeats, draws FROM performance
             WHERE username = 'tracked_user' ORDER BY game_mode",
        )
        .unwrap();
    let rows: Vec<(String, i64, i64, i64, i64)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![
            ("blitz".to_string(), 1, 1, 0, 0),
            ("bullet".to_string(), 1, 0, 0, 1),
            ("daily".to_string(), 1, 1, 0, 0),
        ]
    );
}
