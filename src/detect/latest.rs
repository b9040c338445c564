use std::cmp::Ordering;

use crate::dataset::Record;

/// Picks the row with the greatest key; rows without a key rank lowest and
/// ties go to the row later in table order.
pub fn latest_by<'a, K, F>(rows: &[&'a Record], key: F) -> Option<&'a Record>
where
    K: PartialOrd,
    F: Fn(&Record) -> Option<K>,
{
    let mut best: Option<(&'a Record, Option<K>)> = None;
    for row in rows {
        let candidate = key(row);
        let replace = match &best {
            None => true,
            Some((_, current)) => matches!(
                candidate.partial_cmp(current),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        };
        if replace {
            best = Some((*row, candidate));
        }
    }
    best.map(|(row, _)| row)
}

/// Latest row by the first of `date_columns` that any row carries; without
/// such a column the last row in table order wins.
pub fn select_latest<'a>(rows: &[&'a Record], date_columns: &[&str]) -> Option<&'a Record> {
    let column = date_columns
        .iter()
        .find(|col| rows.iter().any(|row| row.has(col)));
    match column {
        Some(col) => latest_by(rows, |row| row.date(col)),
        None => rows.last().copied(),
    }
}

pub fn select_latest_by_number<'a>(rows: &[&'a Record], column: &str) -> Option<&'a Record> {
    latest_by(rows, |row| row.number(column))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::dataset::Ccn;

    fn ccn() -> Ccn {
        "012345".parse().expect("valid ccn")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("date")
    }

    #[test]
    fn picks_latest_date_regardless_of_order() {
        let a = Record::new(ccn()).with_date("month_year", day(20)).with_text("tag", "a");
        let b = Record::new(ccn()).with_date("month_year", day(5)).with_text("tag", "b");
        let rows = vec![&a, &b];
        let picked = select_latest(&rows, &["month_year"]).expect("row");
        assert_eq!(picked.text("tag").as_deref(), Some("a"));
    }

    #[test]
    fn ties_and_missing_dates_resolve_to_later_row() {
        let a = Record::new(ccn()).with_date("month_year", day(5)).with_text("tag", "a");
        let b = Record::new(ccn()).with_date("month_year", day(5)).with_text("tag", "b");
        let c = Record::new(ccn()).with_text("tag", "c");
        let rows = vec![&a, &b, &c];
        let picked = select_latest(&rows, &["month_year"]).expect("row");
        assert_eq!(picked.text("tag").as_deref(), Some("b"));
    }

    #[test]
    fn falls_back_to_table_order_and_second_column() {
        let a = Record::new(ccn()).with_text("tag", "a");
        let b = Record::new(ccn()).with_text("tag", "b");
        let rows = vec![&a, &b];
        let picked = select_latest(&rows, &["month_year"]).expect("row");
        assert_eq!(picked.text("tag").as_deref(), Some("b"));

        let c = Record::new(ccn()).with_date("as_of_date", day(9)).with_text("tag", "c");
        let d = Record::new(ccn()).with_date("as_of_date", day(2)).with_text("tag", "d");
        let rows = vec![&c, &d];
        let picked = select_latest(&rows, &["reporting_period_end_date", "as_of_date"])
            .expect("row");
        assert_eq!(picked.text("tag").as_deref(), Some("c"));
        assert!(select_latest(&[], &["month_year"]).is_none());
    }

    #[test]
    fn numeric_key_selection() {
        let a = Record::new(ccn()).with_number("fiscal_year", 2025.0).with_text("tag", "a");
        let b = Record::new(ccn()).with_number("fiscal_year", 2024.0).with_text("tag", "b");
        let rows = vec![&a, &b];
        let picked = select_latest_by_number(&rows, "fiscal_year").expect("row");
        assert_eq!(picked.text("tag").as_deref(), Some("a"));
    }
}
