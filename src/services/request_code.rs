//! Sequential request codes: `REQ-YYYYMMDD-NNNN`.
//!
//! The number comes from a persisted counter bumped with a single
//! insert-or-increment statement inside the creating transaction, so two
//! concurrent creates can never draw the same number and a rolled-back create
//! never publishes one.

use crate::entities::request_code_sequence::{self, Entity as SequenceEntity};
use crate::errors::ServiceError;
use chrono::NaiveDate;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ConnectionTrait, EntityTrait, Set,
};

const REQUEST_SEQUENCE: &str = "request_code";

/// Renders a request code. Numbers above 9999 simply widen.
pub fn format_request_code(date: NaiveDate, number: i64) -> String {
    format!("REQ-{}-{:04}", date.format("%Y%m%d"), number)
}

/// Draws the next number from the global request counter.
pub async fn next_request_number<C>(conn: &C) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let seed = request_code_sequence::ActiveModel {
        name: Set(REQUEST_SEQUENCE.to_string()),
        value: Set(1),
    };

    SequenceEntity::insert(seed)
        .on_conflict(
            OnConflict::column(request_code_sequence::Column::Name)
                .value(
                    request_code_sequence::Column::Value,
                    Expr::col((SequenceEntity, request_code_sequence::Column::Value)).add(1),
                )
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let sequence = SequenceEntity::find_by_id(REQUEST_SEQUENCE.to_string())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::InternalError("request code counter missing".to_string()))?;

    Ok(sequence.value)
}

/// Draws the next number and renders it for `today` (UTC).
pub async fn next_request_code<C>(conn: &C, today: NaiveDate) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    let number = next_request_number(conn).await?;
    Ok(format_request_code(today, number))
}
