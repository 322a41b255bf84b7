//! Users are identified by their LINE user ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounting::tax::ConsumptionTaxMethod;

/// Default business type for new users
pub const DEFAULT_BUSINESS_TYPE: &str = "個人事業主";

/// Default fiscal year end (MM-DD)
pub const DEFAULT_FISCAL_YEAR_END: &str = "12-31";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub line_user_id: String,
    pub business_name: Option<String>,
    pub business_type: String,
    pub fiscal_year_end: String,
    pub tax_method: ConsumptionTaxMethod,
    /// Eligible for the blue return special deduction
    pub blue_return_eligible: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user with default bookkeeping settings
    pub fn new(line_user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            line_user_id: line_user_id.into(),
            business_name: None,
            business_type: DEFAULT_BUSINESS_TYPE.to_string(),
            fiscal_year_end: DEFAULT_FISCAL_YEAR_END.to_string(),
            tax_method: ConsumptionTaxMethod::Standard,
            blue_return_eligible: true,
            created_at: Utc::now(),
        }
    }
}
