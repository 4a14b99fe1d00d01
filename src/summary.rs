use crate::models::{
    BackendMode, DashboardResponse, SeriesPoint, TableRow, Transaction,
};
use crate::state::Session;
use rust_decimal::Decimal;

/// Total balance.
pub fn compute_summary(list: &[Transaction]) -> Decimal {
    list.iter().map(|tx| tx.amount).sum()
}

/// Running balance in date order, one point per transaction.
pub fn compute_cumulative_series(list: &[Transaction]) -> Vec<SeriesPoint> {
    let mut sorted: Vec<&Transaction> = list.iter().collect();
    sorted.sort_by_key(|tx| tx.date);

    let mut balance = Decimal::ZERO;
    sorted
        .into_iter()
        .map(|tx| {
            balance += tx.amount;
            SeriesPoint {
                date: tx.date,
                balance,
            }
        })
        .collect()
}

/// Newest first. Rows carry edit/delete controls only for admins.
pub fn render_table(list: &[Transaction], privileged: bool) -> Vec<TableRow> {
    let mut sorted: Vec<&Transaction> = list.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    sorted
        .into_iter()
        .map(|tx| TableRow {
            id: tx.id.clone(),
            date: tx.date,
            description: tx
                .description
                .as_deref()
                .filter(|text| !text.is_empty())
                .unwrap_or("-")
                .to_string(),
            amount: tx.amount,
            amount_display: format_rupiah(tx.amount),
            editable: privileged,
        })
        .collect()
}

/// `Rp` with Indonesian digit grouping, e.g. `-Rp1.200.000,5`.
pub fn format_rupiah(amount: Decimal) -> String {
    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    let abs = amount.abs().round_dp(3);
    let whole = abs.trunc().to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let fraction = abs.fract().normalize();
    if fraction.is_zero() {
        format!("{sign}Rp{grouped}")
    } else {
        let digits = fraction.to_string();
        let digits = digits.split('.').nth(1).unwrap_or_default();
        format!("{sign}Rp{grouped},{digits}")
    }
}

pub fn build_dashboard(
    mode: BackendMode,
    session: &Session,
    list: &[Transaction],
    revision: u64,
) -> DashboardResponse {
    let total = compute_summary(list);
    DashboardResponse {
        mode,
        mode_label: mode.label(),
        session: session.to_response(),
        revision,
        total,
        total_display: format_rupiah(total),
        series: compute_cumulative_series(list),
        rows: render_table(list, session.privileged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionId;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn tx(id: &str, date: &str, amount: &str) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            description: None,
            amount: Decimal::from_str(amount).unwrap(),
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("c", "2024-03-01", "-1200.25"),
            tx("a", "2024-01-01", "5000"),
            tx("d", "2024-03-01", "0.1"),
            tx("b", "2024-02-01", "0.2"),
        ]
    }

    #[test]
    fn summary_is_order_independent() {
        let list = sample();
        let mut reversed = list.clone();
        reversed.reverse();
        assert_eq!(compute_summary(&list), Decimal::from_str("3800.05").unwrap());
        assert_eq!(compute_summary(&list), compute_summary(&reversed));
    }

    #[test]
    fn cumulative_series_ends_at_summary() {
        let list = sample();
        let series = compute_cumulative_series(&list);
        assert_eq!(series.len(), list.len());
        assert_eq!(series.last().unwrap().balance, compute_summary(&list));
        let dates: Vec<_> = series.iter().map(|p| p.date.to_string()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-02-01", "2024-03-01", "2024-03-01"]);
        // Equal dates keep input order: c before d.
        assert_eq!(series[2].balance, Decimal::from_str("3799.95").unwrap());
    }

    #[test]
    fn empty_list_has_empty_series_and_zero_total() {
        assert_eq!(compute_summary(&[]), Decimal::ZERO);
        assert!(compute_cumulative_series(&[]).is_empty());
        assert!(render_table(&[], true).is_empty());
    }

    #[test]
    fn table_is_newest_first_and_gated_by_privilege() {
        let list = sample();
        let rows = render_table(&list, false);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "d", "b", "a"]);
        assert!(rows.iter().all(|r| !r.editable));
        assert_eq!(rows[0].description, "-");

        assert!(render_table(&list, true).iter().all(|r| r.editable));
    }

    #[test]
    fn rupiah_formatting() {
        assert_eq!(format_rupiah(Decimal::from(5000)), "Rp5.000");
        assert_eq!(format_rupiah(Decimal::from(-1_200_000)), "-Rp1.200.000");
        assert_eq!(format_rupiah(Decimal::from(999)), "Rp999");
        assert_eq!(format_rupiah(Decimal::ZERO), "Rp0");
        assert_eq!(format_rupiah(Decimal::from_str("1234.50").unwrap()), "Rp1.234,5");
    }

    #[test]
    fn dashboard_combines_all_views() {
        let list = vec![tx("a", "2024-01-01", "5000"), tx("b", "2024-01-02", "-1200")];
        let dashboard = build_dashboard(BackendMode::Local, &Session::default(), &list, 7);
        assert_eq!(dashboard.total, Decimal::from(3800));
        assert_eq!(dashboard.total_display, "Rp3.800");
        let balances: Vec<_> = dashboard.series.iter().map(|p| p.balance).collect();
        assert_eq!(balances, [Decimal::from(5000), Decimal::from(3800)]);
        assert_eq!(dashboard.rows.len(), 2);
        assert_eq!(dashboard.revision, 7);
        assert!(!dashboard.session.privileged);
    }
}
