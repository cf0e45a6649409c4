//! Borrow request model, date ranges and status transitions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Wire and storage format for calendar dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Borrow request status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    #[default]
    Pending,
    Approved,
    Denied,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Approved => "approved",
            BorrowStatus::Denied => "denied",
        }
    }

    /// Inventory effect of moving from `self` to `target`.
    ///
    /// Re-applying `approved` or `denied` is a no-op. A denied request can
    /// never be approved again, and `pending` is never a valid target.
    pub fn transition_to(self, target: BorrowStatus) -> AppResult<InventoryEffect> {
        use BorrowStatus::*;

        match (self, target) {
            (Approved, Approved) | (Denied, Denied) => Ok(InventoryEffect::Unchanged),
            (Pending, Approved) => Ok(InventoryEffect::TakeCopy),
            (Pending, Denied) => Ok(InventoryEffect::None),
            (Approved, Denied) => Ok(InventoryEffect::ReturnCopy),
            (Denied, Approved) => Err(AppError::Validation(
                "A denied request cannot be approved".to_string(),
            )),
            (Pending, Pending) | (Approved, Pending) | (Denied, Pending) => Err(AppError::Validation(
                "Status must be 'approved' or 'denied'".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BorrowStatus::Pending),
            "approved" => Ok(BorrowStatus::Approved),
            "denied" => Ok(BorrowStatus::Denied),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

// SQLx conversion for BorrowStatus (stored as text)
impl sqlx::Type<Postgres> for BorrowStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for BorrowStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// What a status change does to the book's inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryEffect {
    /// Target equals current status; nothing is written
    Unchanged,
    /// Status changes, inventory does not
    None,
    TakeCopy,
    ReturnCopy,
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        Self::new(parse_date("start_date", start)?, parse_date("end_date", end)?)
    }

    /// True when both ranges share at least one day
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        AppError::Validation(format!("{} must be a date formatted as YYYY-MM-DD", field))
    })
}

/// Borrow request row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRequest {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BorrowStatus,
}

impl BorrowRequest {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// Create borrow request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBorrowRequest {
    pub book_id: i32,
    /// YYYY-MM-DD
    pub start_date: String,
    /// YYYY-MM-DD
    pub end_date: String,
}

/// Status update body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateBorrowStatus {
    pub status: BorrowStatus,
}

/// One line of a user's borrow history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct BorrowHistoryEntry {
    pub id: i32,
    pub book_title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BorrowStatus,
}
