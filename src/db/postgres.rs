use super::{sanitize_parameters, ParameterStore};
use crate::models::TradeParameter;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

/// Optimizer results older than this are ignored
pub const MAX_RESULT_AGE_DAYS: i64 = 30;

/// Reads trade parameters from the optimizer's `backtest_results` table
pub struct PostgresParameterStore {
    pool: PgPool,
    max_age_days: i64,
}

impl PostgresParameterStore {
    /// Connect to Postgres
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;

        tracing::info!("Connected to parameter store");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            max_age_days: MAX_RESULT_AGE_DAYS,
        }
    }

    /// Most recent row per (symbol, timeframe) created after `cutoff`
    pub async fn load_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<TradeParameter>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (symbol, timeframe)
                   symbol, timeframe, tp_m, sl_m, created_at
            FROM backtest_results
            WHERE created_at >= $1
            ORDER BY symbol, timeframe, created_at DESC
            "#,
        )
        .bind(cutoff.naive_utc())
        .fetch_all(&self.pool)
        .await?;

        let mut parameters = Vec::with_capacity(rows.len());
        for row in rows {
            let tp_m: i32 = row.try_get("tp_m")?;
            let sl_m: i32 = row.try_get("sl_m")?;

            parameters.push(TradeParameter {
                symbol: row.try_get("symbol")?,
                timeframe: row.try_get("timeframe")?,
                tp_multiplier: tp_m as f64,
                sl_multiplier: sl_m as f64,
            });
        }

        Ok(parameters)
    }
}

#[async_trait]
impl ParameterStore for PostgresParameterStore {
    async fn active_parameters(&self) -> Result<Vec<TradeParameter>> {
        let cutoff = Utc::now() - chrono::Duration::days(self.max_age_days);
        let parameters = sanitize_parameters(self.load_since(cutoff).await?);

        tracing::info!(
            "Loaded {} active trade parameters from last {} days",
            parameters.len(),
            self.max_age_days
        );

        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_store() -> PostgresParameterStore {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/bracketbot_test".to_string());

        PostgresParameterStore::new(&database_url)
            .await
            .expect("Failed to connect to test database")
    }

    #[tokio::test]
    #[ignore] // Requires Postgres with the backtest_results table
    async fn test_latest_row_per_symbol_and_timeframe() {
        let store = get_test_store().await;

        sqlx::query("DELETE FROM backtest_results WHERE symbol = 'TESTUSDT'")
            .execute(&store.pool)
            .await
            .unwrap();

        for (tp, sl, age_days) in [(5, 1, 3), (7, 4, 1), (9, 2, 45)] {
            sqlx::query(
                r#"
                INSERT INTO backtest_results
                    (symbol, timeframe, start_date, num_trades, return_percentage,
                     winrate, max_drawdown, tp_m, sl_m, created_at)
                VALUES ('TESTUSDT', '15m', '30 day ago UTC', 10, 1.0, 50.0, 5.0, $1, $2,
                        NOW() - make_interval(days => $3))
                "#,
            )
            .bind(tp)
            .bind(sl)
            .bind(age_days)
            .execute(&store.pool)
            .await
            .unwrap();
        }

        let parameters = store.active_parameters().await.unwrap();
        let test_rows: Vec<_> = parameters
            .iter()
            .filter(|p| p.symbol == "TESTUSDT")
            .collect();

        assert_eq!(test_rows.len(), 1);
        assert_eq!(test_rows[0].tp_multiplier, 7.0);
        assert_eq!(test_rows[0].sl_multiplier, 4.0);

        sqlx::query("DELETE FROM backtest_results WHERE symbol = 'TESTUSDT'")
            .execute(&store.pool)
            .await
            .unwrap();
    }
}
