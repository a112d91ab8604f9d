//! Full-text search string generation
//!
//! The client's search box accepts dates in whatever shape people type them:
//! `5/8/77`, `05-08-1977`, `1977.5.8`, `5.77`, and so on. Rather than parse
//! queries, every show row carries a search text containing all delimiter and
//! ordering permutations of its date, so a plain substring match finds it.

use crate::db::ShowRecord;

const SEPARATORS: &[&str] = &["-", "/", "."];

/// Expand a show's date plus its venue, location, members, and songs into the
/// search text persisted alongside the row.
pub fn search_text_for_show(show: &ShowRecord, members: &[String], songs: &[String]) -> String {
    let mut parts = date_permutations(&show.date);

    for field in [
        &show.venue,
        &show.city,
        &show.state,
        &show.location_raw,
    ] {
        if !field.trim().is_empty() {
            parts.push(field.clone());
        }
    }

    if !members.is_empty() {
        parts.push(members.join(" "));
    }
    if !songs.is_empty() {
        parts.push(songs.join(" "));
    }

    parts.join(" ")
}

/// All date permutations for an ISO `YYYY-MM-DD` date string.
///
/// Includes: the year, the 2-digit year, the 3-digit decade prefix, every
/// month/day/year and day/month/year and year/month/day ordering (padded and
/// unpadded, 4- and 2-digit year) with `-`, `/`, and `.` separators, and
/// month/year-only variants. An unparseable date yields just the raw string.
pub fn date_permutations(date: &str) -> Vec<String> {
    let mut parts = date.splitn(3, '-');
    let (year, month, day) = match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) => match (m.parse::<u32>(), d.parse::<u32>()) {
            (Ok(m), Ok(d)) if y.len() == 4 => (y.to_string(), m, d),
            _ => return vec![date.to_string()],
        },
        _ => return vec![date.to_string()],
    };

    let year2 = year[2..].to_string();
    let decade = year[..3].to_string();

    let month_forms = [month.to_string(), format!("{month:02}")];
    let day_forms = [day.to_string(), format!("{day:02}")];
    let year_forms = [year.clone(), year2.clone()];

    let mut out: Vec<String> = vec![year.clone(), year2, decade];

    for sep in SEPARATORS {
        for m in &month_forms {
            for d in &day_forms {
                for y in &year_forms {
                    push_unique(&mut out, format!("{m}{sep}{d}{sep}{y}"));
                    push_unique(&mut out, format!("{d}{sep}{m}{sep}{y}"));
                    push_unique(&mut out, format!("{y}{sep}{m}{sep}{d}"));
                }
            }
            for y in &year_forms {
                push_unique(&mut out, format!("{m}{sep}{y}"));
            }
        }
    }

    out
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}
