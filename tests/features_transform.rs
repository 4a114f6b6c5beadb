use chess_etl::{
    normalize_game, parse_games_response, transform_games, Color, EcoCatalog, FeatureError,
    MatchResult, NormalizedGame, RawGamePayload,
};

const JAN: &[u8] = include_bytes!("fixtures/games_2023_01.json");
const FEB: &[u8] = include_bytes!("fixtures/games_2023_02.json");
const ECO: &[u8] = include_bytes!("fixtures/eco_codes.csv");

fn payloads(raw: &[u8]) -> Vec<RawGamePayload> {
    parse_games_response("fixture", raw).expect("fixture should decode")
}

fn normalized(raw: &[u8]) -> Vec<NormalizedGame> {
    payloads(raw)
        .iter()
        .filter_map(|p| normalize_game(p, "tracked_user").expect("fixture should normalize"))
        .collect()
}

fn eco() -> EcoCatalog {
    EcoCatalog::from_reader(ECO).expect("eco fixture should parse")
}

#[test]
fn white_side_game_is_fully_enriched() {
    let games = normalized(JAN);
    assert_eq!(games.len(), 2, "the game without a move-log is skipped");

    let rows = transform_games(&games[..1], &eco()).unwrap();
    let row = &rows[0];

    assert_eq!(row.game_id, 70_000_000_001);
    assert_eq!(row.game_mode.as_deref(), Some("blitz"));
    assert_eq!(row.start_date, "2023-01-20");
    assert_eq!(row.user_color, Color::White);
    assert_eq!(row.user_rating, 1510);
    assert_eq!(row.opponent, "rival_one");
    assert_eq!(row.rating_diff, 20);
    assert_eq!(row.user_accuracy, Some(82.1));
    assert_eq!(row.opponent_accuracy, Some(64.3));
    assert_eq!(row.match_result, Some(MatchResult::Win));
    assert_eq!(row.result_subcategory, "win");
    assert_eq!(row.start_date_time.to_string(), "2023-01-20 18:00:00");
    assert_eq!(row.end_date_time.to_string(), "2023-01-20 18:05:10");
    assert_eq!(row.game_duration_sec, 310);
    assert_eq!(row.game_duration, "00:05:10");
    assert_eq!(row.rounds, Some(3));
    // white clocks 180, 177, 172
    assert_eq!(row.user_avg_move_time_sec, 4.0);
    assert_eq!(row.opening.as_deref(), Some("Italian Game"));
}

#[test]
fn black_side_uses_odd_plies_and_unmatched_eco_is_none() {
    let games = normalized(FEB);
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].user_color, Color::Black);

    let rows = transform_games(&games, &eco()).unwrap();
    let row = &rows[0];
    assert_eq!(row.user_rating, 1590);
    assert_eq!(row.rating_diff, -10);
    assert_eq!(row.user_accuracy, None);
    assert_eq!(row.match_result, Some(MatchResult::Draw));
    assert_eq!(row.result_subcategory, "agreed");
    // black clocks 60, 58
    assert_eq!(row.user_avg_move_time_sec, 2.0);
    assert_eq!(row.opening, None);
    assert_eq!(row.game_duration, "00:02:30");
}

#[test]
fn match_result_follows_the_result_header_not_the_user_side() {
    let games = normalized(JAN);
    let daily = games
        .iter()
        .find(|g| g.game_id == 500_000_002)
        .expect("daily game present");
    assert_eq!(daily.user_color, Color::Black);

    let rows = transform_games(std::slice::from_ref(daily), &eco()).unwrap();
    assert_eq!(rows[0].match_result, Some(MatchResult::Defeat));
    assert_eq!(rows[0].result_subcategory, "win");
    assert_eq!(rows[0].user_avg_move_time_sec, 0.0, "no clock annotations");
    assert_eq!(rows[0].opening.as_deref(), Some("Scandinavian Defense"));
}

#[test]
fn missing_start_time_fails_the_whole_batch() {
    let mut games = normalized(JAN);
    games[1].start_time = None;
    let bad_id = games[1].game_id;

    let err = transform_games(&games, &eco()).unwrap_err();
    assert_eq!(err, FeatureError::MissingStartTime { game_id: bad_id });
}

#[test]
fn malformed_start_time_is_an_input_error() {
    let mut games = normalized(FEB);
    games[0].start_time = Some("25:99".to_string());
    assert!(matches!(
        transform_games(&games, &eco()),
        Err(FeatureError::InvalidStartTimestamp { .. })
    ));
}
