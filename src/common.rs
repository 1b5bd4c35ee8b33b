/// Common types and utilities shared across handlers and services
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// One page of a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Page numbers start at 1; a zero page or limit is bumped to 1.
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Row offset of the first item on this page. Pages past what the
    /// store can address (`OFFSET` is a signed 64-bit value) are rejected.
    pub fn offset(&self) -> Result<u64, ServiceError> {
        (self.page - 1)
            .checked_mul(self.limit)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!(
                    "page {} with limit {} is out of range",
                    self.page, self.limit
                ))
            })
    }

    /// Zero-based page index for the paginator, once the offset is known to fit.
    pub fn index(&self) -> Result<u64, ServiceError> {
        self.offset()?;
        Ok(self.page - 1)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub last_page: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageMeta {
    pub fn new(total: u64, page: PageRequest) -> Self {
        let last_page = total.div_ceil(page.limit);
        Self {
            total,
            page: page.page,
            limit: page.limit,
            last_page,
            has_next_page: page.page < last_page,
            has_prev_page: page.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, page: PageRequest) -> Self {
        Self {
            data,
            meta: PageMeta::new(total, page),
        }
    }
}

/// Half-open UTC range `[start 00:00, day after end 00:00)` covering both dates.
pub fn date_range(
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    if end < start {
        return Err(ServiceError::InvalidInput(format!(
            "end date {} is before start date {}",
            end, start
        )));
    }

    let from = start
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ServiceError::InvalidInput("Invalid start date time".to_string()))?
        .and_utc();

    let until = end
        .checked_add_days(Days::new(1))
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ServiceError::InvalidInput("Invalid end date time".to_string()))?
        .and_utc();

    Ok((from, until))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1, 10, 0, false, false)]
    #[case(25, 1, 10, 3, true, false)]
    #[case(25, 3, 10, 3, false, true)]
    #[case(30, 2, 10, 3, true, true)]
    #[case(5, 1, 5, 1, false, false)]
    fn page_meta_matches_counts(
        #[case] total: u64,
        #[case] page: u64,
        #[case] limit: u64,
        #[case] last_page: u64,
        #[case] has_next: bool,
        #[case] has_prev: bool,
    ) {
        let meta = PageMeta::new(total, PageRequest::new(page, limit));
        assert_eq!(meta.last_page, last_page);
        assert_eq!(meta.has_next_page, has_next);
        assert_eq!(meta.has_prev_page, has_prev);
    }

    #[test]
    fn zero_page_and_limit_are_normalized() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page, PageRequest { page: 1, limit: 1 });
        assert_eq!(page.offset().unwrap(), 0);
        assert_eq!(PageRequest::new(3, 20).offset().unwrap(), 40);
        assert_eq!(PageRequest::new(3, 20).index().unwrap(), 2);
    }

    #[rstest]
    #[case(u64::MAX, 100)]
    #[case(u64::MAX, 1)]
    #[case(u64::MAX / 2, 3)]
    fn overflowing_pages_are_invalid(#[case] page: u64, #[case] limit: u64) {
        let page = PageRequest::new(page, limit);
        assert!(matches!(page.offset(), Err(ServiceError::InvalidInput(_))));
        assert!(matches!(page.index(), Err(ServiceError::InvalidInput(_))));
    }

    #[test]
    fn meta_serializes_in_camel_case() {
        let value = serde_json::to_value(PageMeta::new(11, PageRequest::new(1, 10))).unwrap();
        assert_eq!(value["lastPage"], 2);
        assert_eq!(value["hasNextPage"], true);
        assert_eq!(value["hasPrevPage"], false);
    }

    #[test]
    fn date_range_covers_whole_end_day() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let (from, until) = date_range(start, start).unwrap();
        assert_eq!(from.to_rfc3339(), "2025-01-31T00:00:00+00:00");
        assert_eq!(until.to_rfc3339(), "2025-02-01T00:00:00+00:00");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let start = NaiveDate::from_ymd_opt(2025, 2, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert!(matches!(
            date_range(start, end),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
