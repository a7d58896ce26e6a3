use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::receipt_validations::{InsertReceiptValidationEntity, ReceiptValidationEntity},
    repositories::receipt_validations::ReceiptValidationRepository,
    schema::receipt_validations,
};

pub struct ReceiptValidationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ReceiptValidationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ReceiptValidationRepository for ReceiptValidationPostgres {
    async fn record_validation(&self, entry: InsertReceiptValidationEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(receipt_validations::table)
            .values(&entry)
            .returning(receipt_validations::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(result)
    }

    async fn count_by_receipt_hash(&self, receipt_hash: &str) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let count = receipt_validations::table
            .filter(receipt_validations::receipt_hash.eq(receipt_hash))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(count)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ReceiptValidationEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = receipt_validations::table
            .filter(receipt_validations::user_id.eq(user_id))
            .order(receipt_validations::validated_at.desc())
            .limit(limit.clamp(1, 100))
            .select(ReceiptValidationEntity::as_select())
            .load::<ReceiptValidationEntity>(&mut conn)?;

        Ok(results)
    }
}
