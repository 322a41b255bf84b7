//! Japanese sole-proprietor tax estimates: income tax, consumption tax,
//! depreciation and the common deductions.
//!
//! All amounts are whole yen. Wherever the statutory computation produces a
//! fraction the result is truncated toward zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaxError {
    #[error("Useful life must be at least one year")]
    InvalidUsefulLife,

    #[error("Months used must be between 0 and 12, got {0}")]
    InvalidMonthsUsed(u32),

    #[error("Unknown tax method: {0}")]
    UnknownMethod(String),
}

/// Progressive income tax table: (upper bound inclusive, rate %, quick deduction)
const INCOME_TAX_BRACKETS: [(i64, i64, i64); 7] = [
    (1_950_000, 5, 0),
    (3_300_000, 10, 97_500),
    (6_950_000, 20, 427_500),
    (9_000_000, 23, 636_000),
    (18_000_000, 33, 1_536_000),
    (40_000_000, 40, 2_796_000),
    (i64::MAX, 45, 4_796_000),
];

/// Reconstruction special income tax, per mille of income tax
const RECONSTRUCTION_TAX_PER_MILLE: i64 = 21;

const RESIDENT_TAX_PERCENT: i64 = 10;
const BUSINESS_TAX_PERCENT: i64 = 5;
const BUSINESS_TAX_ALLOWANCE: i64 = 2_900_000;

const LIFE_INSURANCE_CAP: i64 = 120_000;
const MEDICAL_THRESHOLD_CAP: i64 = 100_000;
const MEDICAL_DEDUCTION_CAP: i64 = 2_000_000;

/// Straight-line salvage value as a percentage of cost
const SALVAGE_PERCENT: i128 = 10;

/// How consumption tax is computed for a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumptionTaxMethod {
    #[default]
    #[serde(rename = "原則課税")]
    Standard,
    #[serde(rename = "簡易課税")]
    Simplified,
}

impl ConsumptionTaxMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "原則課税",
            Self::Simplified => "簡易課税",
        }
    }
}

impl fmt::Display for ConsumptionTaxMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ConsumptionTaxMethod {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "原則課税" | "standard" => Ok(Self::Standard),
            "簡易課税" | "simplified" => Ok(Self::Simplified),
            other => Err(TaxError::UnknownMethod(other.to_string())),
        }
    }
}

/// Business category for simplified consumption tax
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimplifiedBusinessType {
    /// Wholesale
    #[serde(rename = "第1種")]
    Type1,
    /// Retail
    #[serde(rename = "第2種")]
    Type2,
    /// Manufacturing
    #[serde(rename = "第3種")]
    Type3,
    #[serde(rename = "第4種")]
    Type4,
    /// Services
    #[default]
    #[serde(rename = "第5種")]
    Type5,
    /// Real estate
    #[serde(rename = "第6種")]
    Type6,
}

impl SimplifiedBusinessType {
    pub fn deemed_purchase_percent(self) -> i64 {
        match self {
            Self::Type1 => 90,
            Self::Type2 => 80,
            Self::Type3 => 70,
            Self::Type4 => 60,
            Self::Type5 => 50,
            Self::Type6 => 40,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Type1 => "第1種",
            Self::Type2 => "第2種",
            Self::Type3 => "第3種",
            Self::Type4 => "第4種",
            Self::Type5 => "第5種",
            Self::Type6 => "第6種",
        }
    }
}

impl FromStr for SimplifiedBusinessType {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Type1,
            Self::Type2,
            Self::Type3,
            Self::Type4,
            Self::Type5,
            Self::Type6,
        ]
        .into_iter()
        .find(|t| t.label() == s.trim())
        .ok_or_else(|| TaxError::UnknownMethod(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomeTax {
    pub taxable_income: i64,
    pub income_tax: i64,
    pub reconstruction_tax: i64,
    pub total_tax: i64,
    /// Marginal rate applied, 0 when there is no taxable income
    pub rate_percent: i64,
}

/// Income tax plus reconstruction special income tax on `taxable_income`.
pub fn income_tax(taxable_income: i64) -> IncomeTax {
    if taxable_income <= 0 {
        return IncomeTax {
            taxable_income: 0,
            income_tax: 0,
            reconstruction_tax: 0,
            total_tax: 0,
            rate_percent: 0,
        };
    }

    let (_, rate, quick_deduction) = INCOME_TAX_BRACKETS
        .iter()
        .copied()
        .find(|(upper, _, _)| taxable_income <= *upper)
        .unwrap_or(INCOME_TAX_BRACKETS[INCOME_TAX_BRACKETS.len() - 1]);

    let gross = (i128::from(taxable_income) * i128::from(rate) / 100) as i64;
    let tax = (gross - quick_deduction).max(0);
    let reconstruction = tax * RECONSTRUCTION_TAX_PER_MILLE / 1000;

    IncomeTax {
        taxable_income,
        income_tax: tax,
        reconstruction_tax: reconstruction,
        total_tax: tax + reconstruction,
        rate_percent: rate,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumptionTax {
    pub sales_tax: i64,
    pub purchase_tax: i64,
    /// Negative when a refund is due
    pub payable_tax: i64,
    pub method: ConsumptionTaxMethod,
}

impl ConsumptionTax {
    pub fn is_refund(&self) -> bool {
        self.payable_tax < 0
    }
}

/// Consumption tax payable from tax received on sales and paid on purchases.
///
/// The simplified method ignores `purchase_tax` and deducts a deemed share of
/// the sales tax instead.
pub fn consumption_tax(
    sales_tax: i64,
    purchase_tax: i64,
    method: ConsumptionTaxMethod,
    business_type: SimplifiedBusinessType,
) -> ConsumptionTax {
    let payable_tax = match method {
        ConsumptionTaxMethod::Standard => sales_tax - purchase_tax,
        ConsumptionTaxMethod::Simplified => {
            let retained = 100 - business_type.deemed_purchase_percent();
            (i128::from(sales_tax) * i128::from(retained) / 100) as i64
        }
    };

    ConsumptionTax {
        sales_tax,
        purchase_tax,
        payable_tax,
        method,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum DepreciationMethod {
    /// 定額法
    #[default]
    StraightLine,
    /// 200% 定率法, first-year amount
    DecliningBalance,
}

impl DepreciationMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::StraightLine => "定額法",
            Self::DecliningBalance => "定率法",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Depreciation {
    pub acquisition_cost: i64,
    pub useful_life: u32,
    pub method: DepreciationMethod,
    pub annual_depreciation: i64,
    /// Annual amount prorated by months in use
    pub depreciation: i64,
    pub months_used: u32,
}

pub fn depreciation(
    acquisition_cost: i64,
    useful_life: u32,
    method: DepreciationMethod,
    months_used: u32,
) -> Result<Depreciation, TaxError> {
    if useful_life == 0 {
        return Err(TaxError::InvalidUsefulLife);
    }
    if months_used > 12 {
        return Err(TaxError::InvalidMonthsUsed(months_used));
    }

    let cost = i128::from(acquisition_cost);
    let life = i128::from(useful_life);
    let months = i128::from(months_used);

    // Numerator and denominator of the annual amount, kept exact until the end
    let (numerator, denominator) = match method {
        DepreciationMethod::StraightLine => (cost * (100 - SALVAGE_PERCENT), 100 * life),
        DepreciationMethod::DecliningBalance => (cost * 2, life),
    };

    Ok(Depreciation {
        acquisition_cost,
        useful_life,
        method,
        annual_depreciation: (numerator / denominator) as i64,
        depreciation: (numerator * months / (denominator * 12)) as i64,
        months_used,
    })
}

/// 基礎控除, tapering off for high incomes
pub fn basic_deduction(total_income: i64) -> i64 {
    match total_income {
        i if i <= 24_000_000 => 480_000,
        i if i <= 24_500_000 => 320_000,
        i if i <= 25_000_000 => 160_000,
        _ => 0,
    }
}

/// 青色申告特別控除, never more than the income itself
pub fn blue_return_deduction(income: i64, has_e_filing: bool, has_double_entry: bool) -> i64 {
    let max = match (has_double_entry, has_e_filing) {
        (true, true) => 650_000,
        (true, false) => 550_000,
        (false, _) => 100_000,
    };
    income.clamp(0, max)
}

/// Amounts paid during the year that feed the deductions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionInputs {
    pub social_insurance: i64,
    pub small_business_mutual: i64,
    pub life_insurance: i64,
    pub medical_expense: i64,
    pub has_e_filing: bool,
    pub has_double_entry: bool,
}

impl Default for DeductionInputs {
    fn default() -> Self {
        Self {
            social_insurance: 0,
            small_business_mutual: 0,
            life_insurance: 0,
            medical_expense: 0,
            has_e_filing: false,
            has_double_entry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deductions {
    pub basic: i64,
    pub blue_return: i64,
    pub social_insurance: i64,
    pub small_business_mutual: i64,
    pub life_insurance: i64,
    pub medical: i64,
}

impl Deductions {
    pub fn total(&self) -> i64 {
        self.basic
            + self.blue_return
            + self.social_insurance
            + self.small_business_mutual
            + self.life_insurance
            + self.medical
    }
}

pub fn all_deductions(total_income: i64, inputs: &DeductionInputs) -> Deductions {
    let medical_threshold = MEDICAL_THRESHOLD_CAP.min(total_income.max(0) * 5 / 100);
    let medical = (inputs.medical_expense - medical_threshold).clamp(0, MEDICAL_DEDUCTION_CAP);

    Deductions {
        basic: basic_deduction(total_income),
        blue_return: blue_return_deduction(
            total_income,
            inputs.has_e_filing,
            inputs.has_double_entry,
        ),
        social_insurance: inputs.social_insurance,
        small_business_mutual: inputs.small_business_mutual,
        life_insurance: inputs.life_insurance.min(LIFE_INSURANCE_CAP),
        medical,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnualTaxEstimate {
    pub sales: i64,
    pub expenses: i64,
    pub business_income: i64,
    pub total_deductions: i64,
    pub taxable_income: i64,
    /// Income tax including the reconstruction surtax
    pub income_tax: i64,
    pub resident_tax: i64,
    pub business_tax: i64,
}

impl AnnualTaxEstimate {
    pub fn total(&self) -> i64 {
        self.income_tax + self.resident_tax + self.business_tax
    }
}

/// Rough yearly tax burden from projected sales and expenses.
pub fn estimate_annual_tax(sales: i64, expenses: i64, has_e_filing: bool) -> AnnualTaxEstimate {
    let business_income = sales - expenses;
    let inputs = DeductionInputs {
        has_e_filing,
        ..DeductionInputs::default()
    };
    let total_deductions = all_deductions(business_income, &inputs).total();
    let taxable_income = (business_income - total_deductions).max(0);

    AnnualTaxEstimate {
        sales,
        expenses,
        business_income,
        total_deductions,
        taxable_income,
        income_tax: income_tax(taxable_income).total_tax,
        resident_tax: taxable_income * RESIDENT_TAX_PERCENT / 100,
        business_tax: ((business_income - BUSINESS_TAX_ALLOWANCE) * BUSINESS_TAX_PERCENT / 100)
            .max(0),
    }
}
