use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{Granularity, MeasurementRecord};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Append long-format records in one transaction. Rows already loaded by an
/// earlier run are left untouched.
pub async fn insert_measurements(
    pool: &PgPool,
    granularity: Granularity,
    records: &[MeasurementRecord],
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO kepco_usage.measurements
            (id, granularity, measure_time, measure_point, measure_value, measure_unit,
             country, source_name, business_unit, site_unit, factory, insertion_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (granularity, measure_time, measure_point, business_unit, site_unit, factory)
            DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(granularity.as_str())
        .bind(record.measure_time)
        .bind(&record.measure_point)
        .bind(record.measure_value)
        .bind(&record.measure_unit)
        .bind(&record.country)
        .bind(&record.source_name)
        .bind(&record.business_unit)
        .bind(&record.site_unit)
        .bind(&record.factory)
        .bind(record.insertion_time)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    info!(%granularity, inserted, offered = records.len(), "loaded measurements");
    Ok(inserted)
}
