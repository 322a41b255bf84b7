//! Rule-based reading of free-form Japanese bookkeeping messages.
//!
//! These functions back the analyzer when no language model is configured,
//! and normalise the values a model returns (dates like "昨日").

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::models::account::{
    ACCOUNTS_PAYABLE_OTHER, CASH, ORDINARY_DEPOSIT, SALES, SUPPLIES,
};

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<yen>[¥￥]\s*)?(?P<num>[0-9][0-9,]*(?:\.[0-9]+)?)(?P<unit>\s*[億万千])?(?P<suffix>\s*円|[年月日時分])?",
    )
    .expect("amount pattern is valid")
});

/// Continuation of a compound amount ("3万|5000円", "1億|2000万円")
static AMOUNT_TAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<num>[0-9][0-9,]*)(?P<unit>\s*[万千])?(?P<suffix>\s*円|[年月日時分])?")
        .expect("amount tail pattern is valid")
});

static YMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("ymd pattern is valid")
});

static KANJI_YMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})年\s*(\d{1,2})月\s*(\d{1,2})日").expect("kanji ymd pattern is valid")
});

static KANJI_MD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})月\s*(\d{1,2})日").expect("kanji md pattern is valid")
});

static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})日前").expect("days-ago pattern is valid"));

static DAY_OF_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})日").expect("day pattern is valid"));

/// Keyword rules for the debit (expense) side, checked in order.
const DEBIT_RULES: &[(&[&str], &str)] = &[
    (
        &[
            "タクシー", "電車", "バス", "新幹線", "飛行機", "uber", "交通", "ホテル", "宿泊",
            "ガソリン", "コインパーキング", "高速",
        ],
        "旅費交通費",
    ),
    (
        &[
            "接待", "飲み会", "会食", "交際", "懇親", "カフェ", "スタバ", "レストラン", "居酒屋",
        ],
        "接待交際費",
    ),
    (&["広告", "宣伝", "マーケティング"], "広告宣伝費"),
    (
        &[
            "インターネット", "ネット代", "サーバー", "ドメイン", "saas", "クラウド", "携帯",
            "電話", "スマホ", "wi-fi",
        ],
        "通信費",
    ),
    (&["家賃", "駐車場", "倉庫", "賃料"], "地代家賃"),
    (&["電気", "ガス代", "ガス料金", "水道", "光熱"], "水道光熱費"),
    (&["セミナー", "研修", "講座", "スクール"], "研修費"),
    (&["書籍", "書店", "本代", "kindle", "新聞", "雑誌", "教材"], "新聞図書費"),
    (&["外注", "業務委託", "フリーランス"], "外注費"),
    (&["手数料"], "支払手数料"),
    (&["税金", "印紙", "固定資産税"], "租税公課"),
    (&["クリーニング"], "雑費"),
    (&["仕入"], "仕入高"),
    (&["文房具", "文具", "事務用品", "amazon", "アマゾン", "消耗品"], "消耗品費"),
];

/// Words that mark a message as income rather than an expense.
const INCOME_KEYWORDS: &[&str] = &[
    "売上", "入金", "報酬", "コンサル料", "振り込まれ", "受け取", "受取", "収入", "受注",
];

const BANK_KEYWORDS: &[&str] = &["銀行", "振込", "振り込", "口座", "引き落とし", "引落"];

const CARD_KEYWORDS: &[&str] = &["クレジット", "カード"];

/// Replace full-width digits and separators with ASCII.
pub(crate) fn normalize_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' | '、' => ',',
            '．' => '.',
            '／' => '/',
            '－' => '-',
            _ => c,
        })
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Convert "1,234.5" with a unit multiplier into whole yen, truncating fractions.
fn amount_value(num: &str, multiplier: i128) -> Option<i64> {
    let cleaned: String = num.chars().filter(|c| *c != ',').collect();
    let (int_part, frac_part) = match cleaned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (cleaned.as_str(), ""),
    };
    let int_value: i128 = int_part.parse().ok()?;
    let mut value = int_value.checked_mul(multiplier)?;
    if !frac_part.is_empty() {
        // Cap precision; anything past 9 digits is below one yen for every unit we accept
        let frac_part = &frac_part[..frac_part.len().min(9)];
        let frac_value: i128 = frac_part.parse().ok()?;
        let scale = 10i128.pow(frac_part.len() as u32);
        value = value.checked_add(frac_value * multiplier / scale)?;
    }
    i64::try_from(value).ok()
}

fn unit_multiplier(unit: Option<&str>) -> i128 {
    match unit.map(str::trim) {
        Some("億") => 100_000_000,
        Some("万") => 10_000,
        Some("千") => 1_000,
        _ => 1,
    }
}

/// Add the smaller units following a leading `億`/`万`/`千` amount.
///
/// Each further unit must be smaller than the previous one; a bare number
/// must be below the last unit. Anything else ends the amount.
fn compound_amount(mut total: i64, mut last: i128, mut rest: &str) -> Option<i64> {
    while let Some(tail) = AMOUNT_TAIL_RE.captures(rest) {
        let suffix = tail.name("suffix").map(|m| m.as_str().trim());
        if matches!(suffix, Some("年" | "月" | "日" | "時" | "分")) {
            break;
        }
        let multiplier = unit_multiplier(tail.name("unit").map(|m| m.as_str()));
        if multiplier >= last {
            break;
        }
        let part = amount_value(&tail["num"], multiplier)?;
        if multiplier == 1 && i128::from(part) >= last {
            break;
        }
        total = total.checked_add(part)?;
        if multiplier == 1 || suffix.is_some() {
            break;
        }
        last = multiplier;
        rest = &rest[tail.get(0).map_or(rest.len(), |m| m.end())..];
    }
    Some(total)
}

/// Extract a yen amount from text.
///
/// Numbers marked as money (a `¥` prefix, a `円` suffix or a 千/万/億 unit) win
/// over bare numbers; numbers that are part of a date or time are ignored.
/// Compound amounts such as `3万5000円` or `1億2000万円` are summed.
pub fn parse_amount(text: &str) -> Option<i64> {
    let text = normalize_width(text);
    let mut bare = None;

    for caps in AMOUNT_RE.captures_iter(&text) {
        let suffix = caps.name("suffix").map(|m| m.as_str().trim());
        if matches!(suffix, Some("年" | "月" | "日" | "時" | "分")) {
            continue;
        }
        let multiplier = unit_multiplier(caps.name("unit").map(|m| m.as_str()));
        let value = amount_value(&caps["num"], multiplier);
        if multiplier > 1 && suffix.is_none() {
            let end = caps.get(0).map_or(text.len(), |m| m.end());
            return value.and_then(|v| compound_amount(v, multiplier, &text[end..]));
        }
        let marked = caps.name("yen").is_some() || multiplier > 1 || suffix == Some("円");
        if marked {
            return value;
        }
        if bare.is_none() {
            bare = value;
        }
    }

    bare
}

/// Resolve a written date relative to `today`. Unrecognised or empty text
/// yields `today`.
pub fn parse_date(text: &str, today: NaiveDate) -> NaiveDate {
    let text = normalize_width(text.trim());
    if text.is_empty() {
        return today;
    }

    let ymd = |y: &str, m: &str, d: &str| {
        NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
    };

    if let Some(date) = YMD_RE
        .captures(&text)
        .and_then(|c| ymd(&c[1], &c[2], &c[3]))
    {
        return date;
    }
    if let Some(date) = KANJI_YMD_RE
        .captures(&text)
        .and_then(|c| ymd(&c[1], &c[2], &c[3]))
    {
        return date;
    }
    if let Some(date) = KANJI_MD_RE.captures(&text).and_then(|c| {
        NaiveDate::from_ymd_opt(today.year(), c[1].parse().ok()?, c[2].parse().ok()?)
    }) {
        return date;
    }

    if contains_any(&text, &["一昨日", "おととい"]) {
        return today - Duration::days(2);
    }
    if contains_any(&text, &["昨日", "きのう"]) {
        return today - Duration::days(1);
    }
    if contains_any(&text, &["今日", "本日", "きょう", "さっき", "先ほど", "先程"]) {
        return today;
    }

    if let Some(days) = DAYS_AGO_RE
        .captures(&text)
        .and_then(|c| c[1].parse::<i64>().ok())
    {
        return today - Duration::days(days);
    }
    if let Some(date) = DAY_OF_MONTH_RE
        .captures(&text)
        .and_then(|c| today.with_day(c[1].parse().ok()?))
    {
        return date;
    }

    today
}

/// Whether the message describes money coming in
pub fn is_income(text: &str) -> bool {
    contains_any(text, INCOME_KEYWORDS)
}

/// Guess the expense account for a message. Defaults to 消耗品費.
pub fn infer_debit_account(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    DEBIT_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&lowered, keywords))
        .map(|(_, account)| *account)
        .unwrap_or(SUPPLIES)
}

/// Guess the credit account: sales for income, otherwise how it was paid.
pub fn infer_credit_account(text: &str) -> &'static str {
    if is_income(text) {
        SALES
    } else if contains_any(text, BANK_KEYWORDS) {
        ORDINARY_DEPOSIT
    } else if contains_any(text, CARD_KEYWORDS) {
        ACCOUNTS_PAYABLE_OTHER
    } else {
        CASH
    }
}

/// Where income was received: cash if stated, the bank otherwise.
pub fn infer_receiving_account(text: &str) -> &'static str {
    if text.contains(CASH) {
        CASH
    } else {
        ORDINARY_DEPOSIT
    }
}
