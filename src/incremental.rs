//! Narrow a requested extraction window using what is already persisted.

use chrono::{Days, NaiveDate};
use tracing::info;

use crate::store::{validate_identifier, StoreError, WarehouseQuery};

// Days re-read before the newest stored game.
pub const LOOKBACK_DAYS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementalBoundary {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementalTarget<'a> {
    pub table: &'a str,
    pub date_column: &'a str,
    pub username_column: &'a str,
}

pub fn resolve_incremental_window(
    store: &dyn WarehouseQuery,
    username: &str,
    target: IncrementalTarget<'_>,
    requested: IncrementalBoundary,
    today: NaiveDate,
) -> Result<IncrementalBoundary, StoreError> {
    validate_identifier(target.table)?;
    validate_identifier(target.date_column)?;
    validate_identifier(target.username_column)?;

    if !store.table_exists(target.table)? {
        info!(
            component = "incremental",
            event = "incremental.first_run",
            username,
            table = target.table,
            start = %requested.start,
            end = %requested.end
        );
        return Ok(requested);
    }

    let Some(max_date) = store.max_value(
        target.table,
        target.date_column,
        (target.username_column, username),
    )?
    else {
        info!(
            component = "incremental",
            event = "incremental.new_user",
            username,
            table = target.table
        );
        return Ok(requested);
    };

    let start = max_date
        .checked_sub_days(Days::new(LOOKBACK_DAYS))
        .unwrap_or(max_date);
    let resolved = IncrementalBoundary { start, end: today };

    info!(
        component = "incremental",
        event = "incremental.resolved",
        username,
        table = target.table,
        max_date = %max_date,
        start = %resolved.start,
        end = %resolved.end
    );

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeStore {
        exists: bool,
        max: Option<NaiveDate>,
        queries: RefCell<Vec<(String, String, String, String)>>,
    }

    impl WarehouseQuery for FakeStore {
        fn table_exists(&self, _table: &str) -> Result<bool, StoreError> {
            Ok(self.exists)
        }

        fn max_value(
            &self,
            table: &str,
            column: &str,
            filter: (&str, &str),
        ) -> Result<Option<NaiveDate>, StoreError> {
            self.queries.borrow_mut().push((
                table.to_string(),
                column.to_string(),
                filter.0.to_string(),
                filter.1.to_string(),
            ));
            Ok(self.max)
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const TARGET: IncrementalTarget<'static> = IncrementalTarget {
        table: "games",
        date_column: "start_date",
        username_column: "username",
    };

    fn requested() -> IncrementalBoundary {
        IncrementalBoundary {
            start: date(2022, 1, 1),
            end: date(2022, 6, 30),
        }
    }

    #[test]
    fn missing_table_keeps_requested_window() {
        let store = FakeStore {
            exists: false,
            max: Some(date(2023, 1, 1)),
            queries: RefCell::new(Vec::new()),
        };
        let out =
            resolve_incremental_window(&store, "alice", TARGET, requested(), date(2024, 5, 1))
                .unwrap();
        assert_eq!(out, requested());
        assert!(store.queries.borrow().is_empty());
    }

    #[test]
    fn unknown_user_keeps_requested_window() {
        let store = FakeStore {
            exists: true,
            max: None,
            queries: RefCell::new(Vec::new()),
        };
        let out =
            resolve_incremental_window(&store, "alice", TARGET, requested(), date(2024, 5, 1))
                .unwrap();
        assert_eq!(out, requested());
    }

    #[test]
    fn existing_rows_move_start_back_two_days_and_end_to_today() {
        let store = FakeStore {
            exists: true,
            max: Some(date(2023, 1, 1)),
            queries: RefCell::new(Vec::new()),
        };
        let today = date(2024, 5, 1);
        let out = resolve_incremental_window(&store, "alice", TARGET, requested(), today).unwrap();
        assert_eq!(out.start, date(2022, 12, 30));
        assert_eq!(out.end, today);
        assert_eq!(
            store.queries.borrow()[0],
            (
                "games".to_string(),
                "start_date".to_string(),
                "username".to_string(),
                "alice".to_string()
            )
        );
    }

    #[test]
    fn bad_identifiers_fail_before_querying() {
        let store = FakeStore {
            exists: true,
            max: None,
            queries: RefCell::new(Vec::new()),
        };
        let target = IncrementalTarget {
            table: "games where 1=1",
            ..TARGET
        };
        assert!(matches!(
            resolve_incremental_window(&store, "alice", target, requested(), date(2024, 5, 1)),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }
}
