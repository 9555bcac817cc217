use chrono::NaiveDate;

const FRENCH_MONTHS: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

fn expand_year(raw: &str) -> Option<i32> {
    let year = if raw.len() == 2 {
        format!("20{raw}")
    } else {
        raw.to_string()
    };
    year.parse().ok()
}

fn month_from_name(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    FRENCH_MONTHS
        .iter()
        .position(|month| *month == name)
        .map(|idx| idx as u32 + 1)
}

/// Normalizes an extracted or user-supplied date token.
///
/// Accepts `D/M/Y`, `D-M-Y`, ISO `Y-M-D` and `D <mois> Y`. Two-digit years
/// are read as 20YY. Returns `None` for anything else, including impossible
/// calendar dates.
pub fn parse_invoice_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    let numeric: Vec<&str> = raw.split(['/', '-']).collect();
    if numeric.len() == 3 {
        if numeric[0].len() == 4 {
            let year = numeric[0].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, numeric[1].parse().ok()?, numeric[2].parse().ok()?);
        }
        let day = numeric[0].parse().ok()?;
        let month = numeric[1].parse().ok()?;
        let year = expand_year(numeric[2])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let words: Vec<&str> = raw.split_whitespace().collect();
    if let [day, month, year] = words.as_slice() {
        return NaiveDate::from_ymd_opt(expand_year(year)?, month_from_name(month)?, day.parse().ok()?);
    }

    None
}
