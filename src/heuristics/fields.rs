use super::{CompanyAlias, ReceiptText, Strategy};
use regex::Regex;

pub(super) const DATE_STRATEGIES: &[(&str, Strategy<String>)] = &[("numeric_date", numeric_date)];

pub(super) const NET_WEIGHT_STRATEGIES: &[(&str, Strategy<f64>)] =
    &[("neto_line", net_weight_line)];

pub(super) const UNIT_PRICE_STRATEGIES: &[(&str, Strategy<f64>)] =
    &[("valor_line", unit_price_line)];

/// First line mentioning any alias wins; within a line, aliases are tried in
/// configured order.
pub(super) fn company_hint(text: &ReceiptText<'_>, companies: &[CompanyAlias]) -> Option<String> {
    let patterns: Vec<(String, &str)> = companies
        .iter()
        .filter(|c| !c.pattern.trim().is_empty())
        .map(|c| (c.pattern.to_lowercase(), c.name.as_str()))
        .collect();

    text.lines.iter().find_map(|line| {
        let line = line.to_lowercase();
        patterns
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, name)| name.to_string())
    })
}

/// "05/03/2024", "5-3-2024" or "2024-03-05" on the first line that has one,
/// normalised to `YYYY-MM-DD`.
fn numeric_date(text: &ReceiptText<'_>) -> Option<String> {
    let re = Regex::new(
        r"([0-9]{1,2})[/\-]([0-9]{1,2})[/\-]([0-9]{4})|([0-9]{4})[/\-]([0-9]{1,2})[/\-]([0-9]{1,2})",
    )
    .ok()?;

    text.lines.iter().find_map(|line| {
        let c = re.captures(line)?;
        if let (Some(day), Some(month), Some(year)) = (c.get(1), c.get(2), c.get(3)) {
            return Some(format!(
                "{}-{:0>2}-{:0>2}",
                year.as_str(),
                month.as_str(),
                day.as_str()
            ));
        }
        Some(format!("{}-{:0>2}-{:0>2}", &c[4], &c[5], &c[6]))
    })
}

/// On the first "neto" line with a number: a thousands-grouped token
/// ("4.590", "4,590") loses its separator, otherwise the first digit run.
fn net_weight_line(text: &ReceiptText<'_>) -> Option<f64> {
    let grouped = Regex::new(r"([0-9]+)[.,]([0-9]{3})").ok()?;
    let plain = Regex::new(r"[0-9]+").ok()?;

    text.lines
        .iter()
        .filter(|line| line.to_lowercase().contains("neto"))
        .find_map(|line| {
            if let Some(c) = grouped.captures(line) {
                return format!("{}{}", &c[1], &c[2]).parse().ok();
            }
            plain.find(line)?.as_str().parse().ok()
        })
}

/// First amount on the first "valor" / "precio" line that has one, e.g.
/// "$1.250 COP". Later lines are not consulted even if that amount is
/// unreadable.
fn unit_price_line(text: &ReceiptText<'_>) -> Option<f64> {
    let re = Regex::new(r"(?i)\$?\s*([0-9][0-9.,]*)\s*(?:COP)?").ok()?;

    let token = text
        .lines
        .iter()
        .filter(|line| {
            let line = line.to_lowercase();
            line.contains("valor") || line.contains("precio")
        })
        .find_map(|line| re.captures(line).map(|c| c[1].to_string()))?;
    parse_amount(&token)
}

/// Separator convention for amounts:
///
/// - both `.` and `,` present: the last separator is the decimal point and
///   every earlier one is grouping (`1,250.50`, `1.250,50` and `1.250,500.75`);
/// - one kind, every occurrence followed by exactly three digits: grouping
///   (`1.250` is 1250, `2,500,000` is 2500000);
/// - otherwise the first separator is the decimal point and reading stops at
///   the next one (`1250,5` is 1250.5, `1.250.5` is 1.25).
pub(super) fn parse_amount(token: &str) -> Option<f64> {
    let token = token.trim_end_matches(['.', ',']);
    let normalized = match (token.contains('.'), token.contains(',')) {
        (false, false) => token.to_string(),
        (true, true) => {
            let last = token.rfind(['.', ','])?;
            let (whole, fraction) = token.split_at(last);
            format!("{}.{}", whole.replace(['.', ','], ""), &fraction[1..])
        }
        (true, false) => ungroup_or_decimal(token, '.'),
        (false, true) => ungroup_or_decimal(token, ','),
    };
    normalized.parse().ok()
}

fn ungroup_or_decimal(token: &str, separator: char) -> String {
    let mut parts = token.split(separator);
    let whole = parts.next().unwrap_or_default();
    let groups: Vec<&str> = parts.collect();

    if groups.iter().all(|group| group.len() == 3) {
        return token.replace(separator, "");
    }
    match groups.first() {
        Some(fraction) => format!("{whole}.{fraction}"),
        None => whole.to_string(),
    }
}
