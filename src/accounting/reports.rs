//! Financial statements and the periodic report texts pushed over LINE.

use chrono::NaiveDate;

use super::format_yen;
use super::tax::estimate_annual_tax;
use crate::models::account::{
    accounts_of_type, AccountType, OPERATING_EXPENSE_ACCOUNTS, PURCHASES, SALES,
};
use crate::models::{JournalEntry, YearMonth};

const RULE: &str = "━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid quarter: {0} (expected 1-4)")]
    InvalidQuarter(u32),

    #[error("Invalid year: {0}")]
    InvalidYear(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfitAndLoss {
    pub month: YearMonth,
    pub sales: i64,
    pub cost_of_sales: i64,
    /// Operating expense accounts with activity, in chart order
    pub expenses: Vec<(&'static str, i64)>,
}

impl ProfitAndLoss {
    pub fn gross_profit(&self) -> i64 {
        self.sales - self.cost_of_sales
    }

    pub fn total_expenses(&self) -> i64 {
        self.expenses.iter().map(|(_, amount)| amount).sum()
    }

    pub fn operating_profit(&self) -> i64 {
        self.gross_profit() - self.total_expenses()
    }

    /// Operating margin in percent, 0 without sales
    pub fn profit_margin(&self) -> f64 {
        if self.sales > 0 {
            self.operating_profit() as f64 / self.sales as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Expenses sorted by amount, largest first
    pub fn expenses_by_size(&self) -> Vec<(&'static str, i64)> {
        let mut sorted = self.expenses.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted
    }
}

fn debit_total(entries: &[JournalEntry], month: YearMonth, account: &str) -> i64 {
    entries
        .iter()
        .filter(|e| month.contains(e.date) && e.debit_account == account)
        .map(|e| e.debit_amount)
        .sum()
}

pub fn profit_and_loss(entries: &[JournalEntry], month: YearMonth) -> ProfitAndLoss {
    let sales = entries
        .iter()
        .filter(|e| month.contains(e.date) && e.credit_account == SALES)
        .map(|e| e.credit_amount)
        .sum();

    let expenses = OPERATING_EXPENSE_ACCOUNTS
        .iter()
        .map(|&account| (account, debit_total(entries, month, account)))
        .filter(|(_, amount)| *amount > 0)
        .collect();

    ProfitAndLoss {
        month,
        sales,
        cost_of_sales: debit_total(entries, month, PURCHASES),
        expenses,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<(&'static str, i64)>,
    pub liabilities: Vec<(&'static str, i64)>,
    /// Credit-positive; owner's drawings therefore appear negative
    pub capital: Vec<(&'static str, i64)>,
}

impl BalanceSheet {
    pub fn total_assets(&self) -> i64 {
        self.assets.iter().map(|(_, v)| v).sum()
    }

    pub fn total_liabilities(&self) -> i64 {
        self.liabilities.iter().map(|(_, v)| v).sum()
    }

    pub fn total_capital(&self) -> i64 {
        self.capital.iter().map(|(_, v)| v).sum()
    }

    pub fn total_liabilities_and_capital(&self) -> i64 {
        self.total_liabilities() + self.total_capital()
    }
}

/// Balance sheet accounts as of `as_of`. Accounts with a zero balance are omitted.
pub fn balance_sheet(entries: &[JournalEntry], as_of: NaiveDate) -> BalanceSheet {
    // Net debit balance per account
    let debit_balance = |account: &str| -> i64 {
        entries
            .iter()
            .filter(|e| e.date <= as_of)
            .map(|e| {
                let mut delta = 0;
                if e.debit_account == account {
                    delta += e.debit_amount;
                }
                if e.credit_account == account {
                    delta -= e.credit_amount;
                }
                delta
            })
            .sum()
    };

    let section = |account_type: AccountType, sign: i64| -> Vec<(&'static str, i64)> {
        accounts_of_type(account_type)
            .map(|account| (account, sign * debit_balance(account)))
            .filter(|(_, balance)| *balance != 0)
            .collect()
    };

    BalanceSheet {
        as_of,
        assets: section(AccountType::Asset, 1),
        liabilities: section(AccountType::Liability, -1),
        capital: section(AccountType::Capital, -1),
    }
}

/// Report sent on the 15th: the month so far.
pub fn mid_month_report(entries: &[JournalEntry], today: NaiveDate) -> String {
    let pl = profit_and_loss(entries, YearMonth::of(today));

    let top: Vec<String> = pl
        .expenses_by_size()
        .into_iter()
        .take(3)
        .map(|(account, amount)| format!("  ・{}: {}円", account, format_yen(amount)))
        .collect();
    let top = if top.is_empty() {
        "  なし".to_string()
    } else {
        top.join("\n")
    };

    format!(
        "【月中レポート {}】\n\n\
         ■ 売上状況\n確定売上: {}円\n\n\
         ■ 経費状況\n今月累計: {}円\n主な経費:\n{}\n\n\
         ■ 収支\n売上総利益: {}円\n営業利益: {}円\n利益率: {:.1}%\n\n\
         ※月末までの見込みに注意して経営判断を行ってください",
        today.format("%Y年%m月%d日"),
        format_yen(pl.sales),
        format_yen(pl.total_expenses()),
        top,
        format_yen(pl.gross_profit()),
        format_yen(pl.operating_profit()),
        pl.profit_margin(),
    )
}

/// Monthly closing report.
pub fn month_end_report(entries: &[JournalEntry], month: YearMonth) -> String {
    let pl = profit_and_loss(entries, month);

    let lines: Vec<String> = pl
        .expenses_by_size()
        .into_iter()
        .map(|(account, amount)| format!("  {}: {}円", account, format_yen(amount)))
        .collect();
    let lines = if lines.is_empty() {
        "  なし".to_string()
    } else {
        lines.join("\n")
    };

    format!(
        "【月次決算レポート {}】\n\n\
         ━━━━━━ 損益サマリー ━━━━━━\n\n\
         売上高: {}円\n売上原価: {}円\n売上総利益: {}円\n\n\
         ━━━━━━ 経費内訳 ━━━━━━\n\n{}\n\n経費合計: {}円\n\n\
         ━━━━━━ 利益 ━━━━━━\n\n\
         営業利益: {}円\n利益率: {:.1}%\n\n{}\n\n\
         詳細な帳簿データが必要な場合は\n「帳簿表示」とメッセージしてください。",
        month,
        format_yen(pl.sales),
        format_yen(pl.cost_of_sales),
        format_yen(pl.gross_profit()),
        lines,
        format_yen(pl.total_expenses()),
        format_yen(pl.operating_profit()),
        pl.profit_margin(),
        RULE,
    )
}

/// Quarter (1-4) a month belongs to
pub fn quarter_of(month: u32) -> u32 {
    (month.saturating_sub(1)) / 3 + 1
}

fn months_of(year: i32, months: impl Iterator<Item = u32>) -> Result<Vec<YearMonth>, ReportError> {
    months
        .map(|m| YearMonth::new(year, m).ok_or(ReportError::InvalidYear(year)))
        .collect()
}

/// Three-month summary with monthly breakdown.
pub fn quarterly_report(
    entries: &[JournalEntry],
    year: i32,
    quarter: u32,
) -> Result<String, ReportError> {
    if !(1..=4).contains(&quarter) {
        return Err(ReportError::InvalidQuarter(quarter));
    }
    let first = (quarter - 1) * 3 + 1;
    let statements: Vec<ProfitAndLoss> = months_of(year, first..first + 3)?
        .into_iter()
        .map(|m| profit_and_loss(entries, m))
        .collect();

    let total_sales: i64 = statements.iter().map(|pl| pl.sales).sum();
    let total_expenses: i64 = statements.iter().map(|pl| pl.total_expenses()).sum();
    let total_profit: i64 = statements.iter().map(|pl| pl.operating_profit()).sum();

    let monthly: Vec<String> = statements
        .iter()
        .map(|pl| {
            format!(
                "  {}: 売上 {}円 / 利益 {}円",
                pl.month,
                format_yen(pl.sales),
                format_yen(pl.operating_profit())
            )
        })
        .collect();

    Ok(format!(
        "【第{}四半期レポート {}年】\n\n\
         ━━━━━━ 四半期サマリー ━━━━━━\n\n\
         売上高合計: {}円\n経費合計: {}円\n四半期利益: {}円\n\n\
         ━━━━━━ 月別推移 ━━━━━━\n\n{}\n\n{}",
        quarter,
        year,
        format_yen(total_sales),
        format_yen(total_expenses),
        format_yen(total_profit),
        monthly.join("\n"),
        RULE,
    ))
}

/// Full-year summary with a rough tax estimate.
pub fn annual_report(entries: &[JournalEntry], year: i32) -> Result<String, ReportError> {
    let statements: Vec<ProfitAndLoss> = months_of(year, 1..=12)?
        .into_iter()
        .map(|m| profit_and_loss(entries, m))
        .collect();

    let sales: i64 = statements.iter().map(|pl| pl.sales).sum();
    let cost: i64 = statements.iter().map(|pl| pl.cost_of_sales).sum();
    let expenses: i64 = statements.iter().map(|pl| pl.total_expenses()).sum();
    let estimate = estimate_annual_tax(sales, cost + expenses, true);

    Ok(format!(
        "【年次決算レポート {}年】\n\n\
         ━━━━━━ 年間損益サマリー ━━━━━━\n\n\
         売上高: {}円\n売上原価: {}円\n経費: {}円\n事業所得: {}円\n\n\
         ━━━━━━ 税金概算 ━━━━━━\n\n\
         所得税: {}円\n住民税: {}円\n事業税: {}円\n合計: {}円\n\n\
         ※確定申告時に正確な税額を計算してください\n\n{}",
        year,
        format_yen(sales),
        format_yen(cost),
        format_yen(expenses),
        format_yen(estimate.business_income),
        format_yen(estimate.income_tax),
        format_yen(estimate.resident_tax),
        format_yen(estimate.business_tax),
        format_yen(estimate.total()),
        RULE,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::ledger::tests::entry;

    fn sample() -> Vec<JournalEntry> {
        vec![
            entry((2024, 1, 5), "現金", "元入金", 100_000, "開業資金"),
            entry((2024, 2, 3), "旅費交通費", "現金", 3_200, "タクシー"),
            entry((2024, 2, 10), "普通預金", "売上高", 500_000, "A社"),
            entry((2024, 2, 12), "仕入高", "普通預金", 100_000, "材料"),
            entry((2024, 2, 14), "接待交際費", "現金", 5_000, "会食"),
            entry((2024, 2, 20), "通信費", "普通預金", 8_000, "ネット代"),
            entry((2024, 2, 25), "事業主貸", "普通預金", 50_000, "生活費"),
            entry((2024, 3, 1), "消耗品費", "未払金", 1_000, "文房具"),
            entry((2024, 3, 15), "売掛金", "売上高", 200_000, "B社"),
        ]
    }

    fn feb() -> YearMonth {
        YearMonth::new(2024, 2).unwrap()
    }

    #[test]
    fn test_profit_and_loss() {
        let pl = profit_and_loss(&sample(), feb());
        assert_eq!(pl.sales, 500_000);
        assert_eq!(pl.cost_of_sales, 100_000);
        assert_eq!(pl.gross_profit(), 400_000);
        assert_eq!(pl.total_expenses(), 16_200);
        assert_eq!(pl.operating_profit(), 383_800);
        assert!((pl.profit_margin() - 76.76).abs() < 1e-9);
        // Owner's drawings are not an expense
        assert!(pl.expenses.iter().all(|(a, _)| *a != "事業主貸"));
        assert_eq!(pl.expenses_by_size()[0], ("通信費", 8_000));
    }

    #[test]
    fn test_profit_margin_without_sales() {
        let pl = profit_and_loss(&sample(), YearMonth::new(2024, 1).unwrap());
        assert_eq!(pl.sales, 0);
        assert_eq!(pl.profit_margin(), 0.0);
    }

    #[test]
    fn test_balance_sheet() {
        let bs = balance_sheet(&sample(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(
            bs.assets,
            vec![("現金", 91_800), ("普通預金", 342_000), ("売掛金", 200_000)]
        );
        assert_eq!(bs.liabilities, vec![("未払金", 1_000)]);
        assert_eq!(bs.capital, vec![("元入金", 100_000), ("事業主貸", -50_000)]);
        assert_eq!(bs.total_assets(), 633_800);
        assert_eq!(bs.total_liabilities_and_capital(), 51_000);
    }

    #[test]
    fn test_mid_month_report() {
        let text = mid_month_report(&sample(), NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
        assert!(text.starts_with("【月中レポート 2024年02月15日】"));
        assert!(text.contains("確定売上: 500,000円"));
        assert!(text.contains("・通信費: 8,000円"));
        assert!(text.contains("利益率: 76.8%"));
    }

    #[test]
    fn test_month_end_report_empty_month() {
        let text = month_end_report(&[], feb());
        assert!(text.contains("【月次決算レポート 2024-02】"));
        assert!(text.contains("  なし"));
        assert!(text.contains("利益率: 0.0%"));
    }

    #[test]
    fn test_quarterly_report() {
        let text = quarterly_report(&sample(), 2024, 1).unwrap();
        assert!(text.contains("【第1四半期レポート 2024年】"));
        assert!(text.contains("売上高合計: 700,000円"));
        assert!(text.contains("  2024-03: 売上 200,000円 / 利益 199,000円"));
        // Sum of monthly operating profits: 0 + 383,800 + 199,000
        assert!(text.contains("四半期利益: 582,800円"));
    }

    #[test]
    fn test_quarterly_report_rejects_bad_quarter() {
        assert_eq!(quarterly_report(&[], 2024, 0), Err(ReportError::InvalidQuarter(0)));
        assert_eq!(quarterly_report(&[], 2024, 5), Err(ReportError::InvalidQuarter(5)));
    }

    #[test]
    fn test_quarter_of() {
        assert_eq!(quarter_of(1), 1);
        assert_eq!(quarter_of(3), 1);
        assert_eq!(quarter_of(4), 2);
        assert_eq!(quarter_of(12), 4);
    }

    #[test]
    fn test_annual_report() {
        let text = annual_report(&sample(), 2024).unwrap();
        assert!(text.contains("売上高: 700,000円"));
        assert!(text.contains("売上原価: 100,000円"));
        assert!(text.contains("経費: 17,200円"));
        assert!(text.contains("事業所得: 582,800円"));
        assert!(text.contains("事業税: 0円"));
    }
}
