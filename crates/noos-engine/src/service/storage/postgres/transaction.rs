use sqlx::{Postgres, Transaction};

use crate::entities::{AlgorithmParameters, NoosResult, Sales, Sku, Store, Style};
use crate::error::EngineResult;

use super::dbutils::DBErrorHandler;
use super::super::StorageTransaction;

pub(super) struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    pub(super) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

fn label_str(label: crate::entities::NoosLabel) -> &'static str {
    match label {
        crate::entities::NoosLabel::Core => "core",
        crate::entities::NoosLabel::Bestseller => "bestseller",
        crate::entities::NoosLabel::Fashion => "fashion",
    }
}

#[crate::async_trait::async_trait]
impl StorageTransaction for PostgresTransaction {
    async fn clear_sales(&mut self) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM sales")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("clear_sales"))?;
        Ok(result.rows_affected())
    }

    async fn clear_skus(&mut self) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM skus")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("clear_skus"))?;
        Ok(result.rows_affected())
    }

    async fn clear_styles(&mut self) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM styles")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("clear_styles"))?;
        Ok(result.rows_affected())
    }

    async fn clear_stores(&mut self) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM stores")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("clear_stores"))?;
        Ok(result.rows_affected())
    }

    async fn insert_styles(&mut self, rows: Vec<Style>) -> EngineResult<()> {
        for row in rows {
            sqlx::query(
                r#"INSERT INTO styles (style, brand, category, sub_category, mrp, gender)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(&row.style)
            .bind(&row.brand)
            .bind(&row.category)
            .bind(&row.sub_category)
            .bind(row.mrp)
            .bind(&row.gender)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("insert_styles"))?;
        }
        Ok(())
    }

    async fn insert_stores(&mut self, rows: Vec<Store>) -> EngineResult<()> {
        for row in rows {
            sqlx::query(r#"INSERT INTO stores (branch, city) VALUES ($1, $2)"#)
                .bind(&row.branch)
                .bind(&row.city)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| e.into_engine_error("insert_stores"))?;
        }
        Ok(())
    }

    async fn insert_skus(&mut self, rows: Vec<Sku>) -> EngineResult<()> {
        for row in rows {
            sqlx::query(r#"INSERT INTO skus (sku, style, size) VALUES ($1, $2, $3)"#)
                .bind(&row.sku)
                .bind(&row.style)
                .bind(&row.size)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| e.into_engine_error("insert_skus"))?;
        }
        Ok(())
    }

    async fn insert_sales(&mut self, rows: Vec<Sales>) -> EngineResult<()> {
        for row in rows {
            sqlx::query(
                r#"INSERT INTO sales (day, sku, channel, quantity, discount, revenue)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(row.day)
            .bind(&row.sku)
            .bind(&row.channel)
            .bind(row.quantity)
            .bind(row.discount)
            .bind(row.revenue)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("insert_sales"))?;
        }
        Ok(())
    }

    async fn style_exists(&mut self, style: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM styles WHERE style = $1")
            .bind(style)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("style_exists"))?;
        Ok(row.is_some())
    }

    async fn sku_exists(&mut self, sku: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM skus WHERE sku = $1")
            .bind(sku)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("sku_exists"))?;
        Ok(row.is_some())
    }

    async fn store_exists(&mut self, branch: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM stores WHERE branch = $1")
            .bind(branch)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("store_exists"))?;
        Ok(row.is_some())
    }

    async fn deactivate_all_parameters(&mut self) -> EngineResult<()> {
        sqlx::query("UPDATE algorithm_parameters SET is_active = FALSE WHERE is_active")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("deactivate_all_parameters"))?;
        Ok(())
    }

    async fn upsert_parameters(&mut self, params: AlgorithmParameters) -> EngineResult<()> {
        sqlx::query(
            r#"INSERT INTO algorithm_parameters
                 (name, is_active, liquidation_threshold, bestseller_multiplier,
                  min_volume_threshold, consistency_threshold, core_duration_months,
                  bestseller_duration_days, analysis_start_date, analysis_end_date,
                  last_updated)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               ON CONFLICT (name) DO UPDATE SET
                 is_active = EXCLUDED.is_active,
                 liquidation_threshold = EXCLUDED.liquidation_threshold,
                 bestseller_multiplier = EXCLUDED.bestseller_multiplier,
                 min_volume_threshold = EXCLUDED.min_volume_threshold,
                 consistency_threshold = EXCLUDED.consistency_threshold,
                 core_duration_months = EXCLUDED.core_duration_months,
                 bestseller_duration_days = EXCLUDED.bestseller_duration_days,
                 analysis_start_date = EXCLUDED.analysis_start_date,
                 analysis_end_date = EXCLUDED.analysis_end_date,
                 last_updated = EXCLUDED.last_updated"#,
        )
        .bind(&params.name)
        .bind(params.is_active)
        .bind(params.liquidation_threshold)
        .bind(params.bestseller_multiplier)
        .bind(params.min_volume_threshold)
        .bind(params.consistency_threshold)
        .bind(params.core_duration_months)
        .bind(params.bestseller_duration_days)
        .bind(params.analysis_start_date)
        .bind(params.analysis_end_date)
        .bind(params.last_updated)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| e.into_engine_error("upsert_parameters"))?;
        Ok(())
    }

    async fn delete_noos_results(&mut self) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM noos_results")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("delete_noos_results"))?;
        Ok(result.rows_affected())
    }

    async fn insert_noos_results(&mut self, rows: Vec<NoosResult>) -> EngineResult<()> {
        for row in rows {
            sqlx::query(
                r#"INSERT INTO noos_results
                     (algorithm_run_id, style_code, category, label, total_quantity, total_revenue,
                      style_ros, days_available, days_with_sales, avg_discount,
                      style_rev_contribution, calculated_date)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
            )
            .bind(row.algorithm_run_id)
            .bind(&row.style_code)
            .bind(&row.category)
            .bind(label_str(row.label))
            .bind(row.total_quantity)
            .bind(row.total_revenue)
            .bind(row.style_ros)
            .bind(row.days_available)
            .bind(row.days_with_sales)
            .bind(row.avg_discount)
            .bind(row.style_rev_contribution)
            .bind(row.calculated_date)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.into_engine_error("insert_noos_results"))?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        self.tx.commit().await.map_err(|e| e.into_engine_error("commit"))
    }

    async fn rollback(self: Box<Self>) -> EngineResult<()> {
        self.tx.rollback().await.map_err(|e| e.into_engine_error("rollback"))
    }
}
