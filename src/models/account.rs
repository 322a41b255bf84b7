//! Chart of accounts and consumption-tax categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cash on hand
pub const CASH: &str = "現金";
/// Ordinary bank deposit
pub const ORDINARY_DEPOSIT: &str = "普通預金";
/// Accounts receivable
pub const ACCOUNTS_RECEIVABLE: &str = "売掛金";
/// Accounts payable (non-trade), used for card purchases
pub const ACCOUNTS_PAYABLE_OTHER: &str = "未払金";
/// Owner's drawings, shown negative under capital
pub const OWNER_DRAWINGS: &str = "事業主貸";
/// Sales revenue
pub const SALES: &str = "売上高";
/// Purchases (cost of sales)
pub const PURCHASES: &str = "仕入高";
/// Fallback expense account
pub const SUPPLIES: &str = "消耗品費";

/// Accounts reported in the monthly expense summary.
pub const EXPENSE_SUMMARY_ACCOUNTS: [&str; 13] = [
    "旅費交通費",
    "接待交際費",
    "消耗品費",
    "広告宣伝費",
    "通信費",
    "地代家賃",
    "水道光熱費",
    "外注費",
    "雑費",
    "研修費",
    "新聞図書費",
    "支払手数料",
    "租税公課",
];

/// Operating expense accounts on the profit and loss statement.
pub const OPERATING_EXPENSE_ACCOUNTS: [&str; 15] = [
    "旅費交通費",
    "接待交際費",
    "消耗品費",
    "広告宣伝費",
    "通信費",
    "地代家賃",
    "水道光熱費",
    "外注費",
    "雑費",
    "研修費",
    "新聞図書費",
    "支払手数料",
    "租税公課",
    "減価償却費",
    "給料賃金",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "資産")]
    Asset,
    #[serde(rename = "負債")]
    Liability,
    #[serde(rename = "資本")]
    Capital,
    #[serde(rename = "収益")]
    Revenue,
    #[serde(rename = "費用")]
    Expense,
}

impl AccountType {
    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Asset => "資産",
            AccountType::Liability => "負債",
            AccountType::Capital => "資本",
            AccountType::Revenue => "収益",
            AccountType::Expense => "費用",
        }
    }
}

/// Consumption-tax treatment of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaxCategory {
    /// Standard rate (10%)
    #[default]
    #[serde(rename = "課税10%")]
    Taxable10,
    /// Reduced rate (8%): food and beverages, newspaper subscriptions
    #[serde(rename = "課税8%")]
    Taxable8,
    /// Exempt: land, residential rent, securities, stamps
    #[serde(rename = "非課税")]
    Exempt,
    /// Outside the tax: salaries, donations, overseas, dividends
    #[serde(rename = "不課税")]
    NonTaxable,
}

impl TaxCategory {
    pub fn label(&self) -> &'static str {
        match self {
            TaxCategory::Taxable10 => "課税10%",
            TaxCategory::Taxable8 => "課税8%",
            TaxCategory::Exempt => "非課税",
            TaxCategory::NonTaxable => "不課税",
        }
    }

    /// Rate in percent for taxable categories
    pub fn rate_percent(&self) -> Option<i64> {
        match self {
            TaxCategory::Taxable10 => Some(10),
            TaxCategory::Taxable8 => Some(8),
            TaxCategory::Exempt | TaxCategory::NonTaxable => None,
        }
    }
}

impl fmt::Display for TaxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tax category: {0}")]
pub struct UnknownTaxCategory(pub String);

impl FromStr for TaxCategory {
    type Err = UnknownTaxCategory;

    /// Accepts the canonical labels plus the purchase/sales variants
    /// ("課税仕入10%", "課税売上8%") that appear in imported data.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('％', "%");
        match normalized.as_str() {
            "課税10%" | "課税仕入10%" | "課税売上10%" => Ok(TaxCategory::Taxable10),
            "課税8%" | "課税仕入8%" | "課税売上8%" => Ok(TaxCategory::Taxable8),
            "非課税" => Ok(TaxCategory::Exempt),
            "不課税" | "対象外" => Ok(TaxCategory::NonTaxable),
            _ => Err(UnknownTaxCategory(s.to_string())),
        }
    }
}

/// One row of the chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDef {
    pub code: &'static str,
    pub name: &'static str,
    pub account_type: AccountType,
    pub category: &'static str,
    pub tax_default: TaxCategory,
}

const fn account(
    code: &'static str,
    name: &'static str,
    account_type: AccountType,
    category: &'static str,
    tax_default: TaxCategory,
) -> AccountDef {
    AccountDef {
        code,
        name,
        account_type,
        category,
        tax_default,
    }
}

use AccountType::{Asset, Capital, Expense, Liability, Revenue};
use TaxCategory::{Exempt, NonTaxable, Taxable10, Taxable8};

/// Chart of accounts for a sole proprietor, ordered by code.
pub const ACCOUNT_MASTER: &[AccountDef] = &[
    account("100", "現金", Asset, "流動資産", NonTaxable),
    account("101", "普通預金", Asset, "流動資産", NonTaxable),
    account("102", "当座預金", Asset, "流動資産", NonTaxable),
    account("110", "売掛金", Asset, "流動資産", NonTaxable),
    account("111", "受取手形", Asset, "流動資産", NonTaxable),
    account("120", "前払金", Asset, "流動資産", Taxable10),
    account("130", "貯蔵品", Asset, "流動資産", Taxable10),
    account("200", "建物", Asset, "固定資産", Taxable10),
    account("201", "車両運搬具", Asset, "固定資産", Taxable10),
    account("202", "工具器具備品", Asset, "固定資産", Taxable10),
    account("203", "ソフトウェア", Asset, "固定資産", Taxable10),
    account("300", "買掛金", Liability, "流動負債", NonTaxable),
    account("301", "未払金", Liability, "流動負債", NonTaxable),
    account("302", "前受金", Liability, "流動負債", NonTaxable),
    account("303", "預り金", Liability, "流動負債", NonTaxable),
    account("310", "短期借入金", Liability, "流動負債", NonTaxable),
    account("320", "長期借入金", Liability, "固定負債", NonTaxable),
    account("400", "元入金", Capital, "資本", NonTaxable),
    account("401", "事業主借", Capital, "資本", NonTaxable),
    account("402", "事業主貸", Capital, "資本", NonTaxable),
    account("500", "売上高", Revenue, "営業収益", Taxable10),
    account("510", "雑収入", Revenue, "営業外収益", Taxable10),
    account("511", "受取利息", Revenue, "営業外収益", Exempt),
    account("600", "仕入高", Expense, "売上原価", Taxable10),
    account("610", "外注費", Expense, "販管費", Taxable10),
    account("620", "給料賃金", Expense, "販管費", NonTaxable),
    account("630", "地代家賃", Expense, "販管費", Exempt),
    account("640", "水道光熱費", Expense, "販管費", Taxable10),
    account("650", "通信費", Expense, "販管費", Taxable10),
    account("660", "旅費交通費", Expense, "販管費", Taxable10),
    account("670", "接待交際費", Expense, "販管費", Taxable10),
    account("680", "消耗品費", Expense, "販管費", Taxable10),
    account("690", "減価償却費", Expense, "販管費", NonTaxable),
    account("700", "租税公課", Expense, "販管費", NonTaxable),
    account("710", "支払利息", Expense, "営業外費用", Exempt),
    account("720", "雑費", Expense, "販管費", Taxable10),
    account("730", "広告宣伝費", Expense, "販管費", Taxable10),
    account("740", "研修費", Expense, "販管費", Taxable10),
    account("750", "新聞図書費", Expense, "販管費", Taxable8),
    account("760", "支払手数料", Expense, "販管費", Taxable10),
];

/// Look up an account by name
pub fn find_account(name: &str) -> Option<&'static AccountDef> {
    ACCOUNT_MASTER.iter().find(|a| a.name == name)
}

/// All account names of a given type, in code order
pub fn accounts_of_type(account_type: AccountType) -> impl Iterator<Item = &'static str> {
    ACCOUNT_MASTER
        .iter()
        .filter(move |a| a.account_type == account_type)
        .map(|a| a.name)
}
