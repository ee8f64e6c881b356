use crate::domain::models::{Prayer, PrayerTime, PrayerTimeSet};
use crate::infrastructure::error::InfraError;
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

/// Extracts a complete prayer time set from an unstructured schedule document.
///
/// Strategies run in priority order and the first one that yields a complete,
/// validated set wins. Partial results are discarded whole; values from
/// different strategies are never combined, so the returned set always comes
/// from one consistent snapshot of the document.
pub fn resolve(document: &str, today: NaiveDate) -> Result<PrayerTimeSet, InfraError> {
    for (name, strategy) in STRATEGIES {
        if let Some(times) = strategy(document, today) {
            tracing::debug!(strategy = name, "document resolved");
            return Ok(times);
        }
        tracing::debug!(strategy = name, "strategy yielded no complete set");
    }
    Err(InfraError::Resolution)
}

type Strategy = fn(&str, NaiveDate) -> Option<PrayerTimeSet>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("structured-payload", structured_payload),
    ("keyed-table", keyed_table),
    ("labeled-text", labeled_text),
    ("generic-positional", generic_positional),
];

/// Strategy 1: an embedded machine-readable `"times"` array. A 5-element
/// array maps directly onto the canonical prayer order; a 6-element array
/// carries a sunrise slot at index 1 which is skipped.
fn structured_payload(document: &str, _today: NaiveDate) -> Option<PrayerTimeSet> {
    let key = find_ci(document, "\"times\"")?;
    let open = document[key..].find('[')? + key;
    let close = document[open..].find(']')? + open;
    let raw: Vec<String> = serde_json::from_str(&document[open..=close]).ok()?;

    let tokens: Vec<PrayerTime> = raw
        .iter()
        .map(|token| PrayerTime::parse_token(token))
        .collect::<Option<Vec<_>>>()?;

    match tokens.len() {
        5 => Some(PrayerTimeSet::new(
            tokens[0], tokens[1], tokens[2], tokens[3], tokens[4],
        )),
        6 => Some(PrayerTimeSet::new(
            tokens[0], tokens[2], tokens[3], tokens[4], tokens[5],
        )),
        _ => None,
    }
}

/// Strategy 2: a monthly table keyed by day-of-month. Rows are expected as
/// `day name, date, islamic date, fajr, sunrise, dhuhr, asr, maghrib, isha`;
/// the sunrise column at index 4 is not a prayer and is skipped.
fn keyed_table(document: &str, today: NaiveDate) -> Option<PrayerTimeSet> {
    let text = flattened(document);
    let day = today.day().to_string();

    for line in text.lines() {
        let cells = split_cells(line);
        if cells.len() < 9 {
            continue;
        }
        let row_is_today = cells
            .iter()
            .take(3)
            .any(|cell| *cell == day || (cell.len() <= 6 && cell.contains(day.as_str())));
        if !row_is_today {
            continue;
        }

        let mut entries = HashMap::new();
        for (prayer, index) in Prayer::ALL.into_iter().zip([3usize, 5, 6, 7, 8]) {
            match cells.get(index).and_then(|cell| PrayerTime::parse_token(cell)) {
                Some(time) => {
                    entries.insert(prayer, time);
                }
                None => {
                    entries.clear();
                    break;
                }
            }
        }
        if let Some(set) = PrayerTimeSet::from_entries(&entries) {
            return Some(set);
        }
    }
    None
}

/// Strategy 3: per-prayer name search. Each prayer is matched independently
/// against its known name variants followed by a nearby time token; the
/// strategy only succeeds if all five prayers match within this document.
fn labeled_text(document: &str, _today: NaiveDate) -> Option<PrayerTimeSet> {
    let lowered = document.to_ascii_lowercase();
    let mut entries = HashMap::new();

    for prayer in Prayer::ALL {
        let mut matched = None;
        for variant in prayer.name_variants() {
            let Some(index) = lowered.find(&variant.to_ascii_lowercase()) else {
                continue;
            };
            let start = index + variant.len();
            let end = floor_char_boundary(document, (start + 48).min(document.len()));
            if let Some(time) = find_time_token(&document[start..end]) {
                matched = Some(time);
                break;
            }
        }
        entries.insert(prayer, matched?);
    }
    PrayerTimeSet::from_entries(&entries)
}

/// Strategy 4: last resort. Near a line mentioning today's day-of-month,
/// collect all time-shaped tokens and assign them positionally under the
/// canonical ordering, skipping the sunrise slot between Fajr and Dhuhr.
fn generic_positional(document: &str, today: NaiveDate) -> Option<PrayerTimeSet> {
    let text = flattened(document);
    let day = today.day().to_string();
    let lines: Vec<&str> = text.lines().collect();

    for (index, line) in lines.iter().enumerate() {
        if !line.contains(day.as_str()) {
            continue;
        }
        let window = lines[index..(index + 5).min(lines.len())].join(" ");
        let tokens = collect_time_tokens(&window);
        if tokens.len() >= 6 {
            return Some(PrayerTimeSet::new(
                tokens[0], tokens[2], tokens[3], tokens[4], tokens[5],
            ));
        }
    }
    None
}

/// Reduces markup to delimited text: table cells become `|`-separated fields,
/// rows become lines, remaining tags are dropped. Plain text passes through.
fn flattened(document: &str) -> String {
    if !document.contains('<') {
        return document.to_string();
    }
    let prepared = document
        .replace("</td>", "|")
        .replace("</TD>", "|")
        .replace("</th>", "|")
        .replace("</TH>", "|")
        .replace("</tr>", "\n")
        .replace("</TR>", "\n");

    let mut text = String::with_capacity(prepared.len());
    let mut in_tag = false;
    for c in prepared.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

fn split_cells(line: &str) -> Vec<&str> {
    let mut best: Vec<&str> = vec![line.trim()];
    for delimiter in ['|', '\t', ';', ','] {
        let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        if cells.len() > best.len() {
            best = cells;
        }
    }
    best
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn find_time_token(text: &str) -> Option<PrayerTime> {
    collect_time_tokens_impl(text, true).into_iter().next()
}

fn collect_time_tokens(text: &str) -> Vec<PrayerTime> {
    collect_time_tokens_impl(text, false)
}

/// Scans for `H:MM` / `HH:MM` / `HHhMM` shaped tokens with in-range values.
fn collect_time_tokens_impl(text: &str, stop_at_first: bool) -> Vec<PrayerTime> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let is_separator =
            j < bytes.len() && (bytes[j] == b':' || bytes[j] == b'h' || bytes[j] == b'H');
        if j - start <= 2 && is_separator {
            let minutes_at = j + 1;
            let has_two_digit_minute = minutes_at + 2 <= bytes.len()
                && bytes[minutes_at].is_ascii_digit()
                && bytes[minutes_at + 1].is_ascii_digit()
                && (minutes_at + 2 == bytes.len() || !bytes[minutes_at + 2].is_ascii_digit());
            if has_two_digit_minute {
                let hour = text[start..j].parse::<u8>().ok();
                let minute = text[minutes_at..minutes_at + 2].parse::<u8>().ok();
                if let Some(time) = hour.zip(minute).and_then(|(h, m)| PrayerTime::new(h, m)) {
                    tokens.push(time);
                    if stop_at_first {
                        return tokens;
                    }
                }
                i = minutes_at + 2;
                continue;
            }
        }
        i = j;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
    }

    fn time(hour: u8, minute: u8) -> PrayerTime {
        PrayerTime::new(hour, minute).expect("in range")
    }

    #[test]
    fn structured_payload_resolves_five_element_array() {
        let document = r#"window.data = {"times":["06:08","13:25","16:23","18:58","20:20"]};"#;
        let set = resolve(document, fixed_day(15)).expect("resolved");
        assert_eq!(
            set,
            PrayerTimeSet::new(
                time(6, 8),
                time(13, 25),
                time(16, 23),
                time(18, 58),
                time(20, 20)
            )
        );
    }

    #[test]
    fn structured_payload_skips_sunrise_in_six_element_array() {
        let document = r#"{"times":["06:08","07:42","13:25","16:23","18:58","20:20"]}"#;
        let set = resolve(document, fixed_day(15)).expect("resolved");
        assert_eq!(set.fajr, time(6, 8));
        assert_eq!(set.dhuhr, time(13, 25));
        assert_eq!(set.isha, time(20, 20));
    }

    #[test]
    fn structured_payload_with_wrong_arity_falls_through() {
        let document = r#"{"times":["06:08","13:25","16:23"]}"#;
        assert!(matches!(
            resolve(document, fixed_day(15)),
            Err(InfraError::Resolution)
        ));
    }

    #[test]
    fn keyed_table_row_for_today_skips_sunrise_column() {
        let document = "\
Sun, 14, 24 Ramadan, 06h32, 07h46, 12h31, 14h29, 16h58, 18h58\n\
Mon, 15, —, 06h30, 07h45, 12h30, 14h30, 17h00, 19h00\n\
Tue, 16, 26 Ramadan, 06h28, 07h43, 12h30, 14h31, 17h02, 19h02\n";
        let set = resolve(document, fixed_day(15)).expect("resolved");
        assert_eq!(
            set,
            PrayerTimeSet::new(
                time(6, 30),
                time(12, 30),
                time(14, 30),
                time(17, 0),
                time(19, 0)
            )
        );
    }

    #[test]
    fn keyed_table_handles_markup_rows() {
        let document = "<table><tr><td>Mon</td><td>15</td><td>25 Ramadan</td>\
<td>06h30</td><td>07h45</td><td>12h30</td><td>14h30</td><td>17h00</td><td>19h00</td></tr></table>";
        let set = resolve(document, fixed_day(15)).expect("resolved");
        assert_eq!(set.fajr, time(6, 30));
        assert_eq!(set.maghrib, time(17, 0));
    }

    #[test]
    fn labeled_text_matches_transliterated_names() {
        let document = "\
Horaires des prières\n\
Fadjr : 06h08\n\
Lever du soleil : 07h42\n\
Dhohr : 13h25\n\
Asr : 16h23\n\
Maghrib : 18h58\n\
Icha : 20h20\n";
        let set = resolve(document, fixed_day(3)).expect("resolved");
        assert_eq!(
            set,
            PrayerTimeSet::new(
                time(6, 8),
                time(13, 25),
                time(16, 23),
                time(18, 58),
                time(20, 20)
            )
        );
    }

    #[test]
    fn labeled_text_with_one_missing_prayer_falls_through() {
        // Four labels only: the strategy must not accept a partial match.
        let document = "Fajr 06:08, Dhuhr 13:25, Asr 16:23, Maghrib 18:58";
        assert!(matches!(
            resolve(document, fixed_day(3)),
            Err(InfraError::Resolution)
        ));
    }

    #[test]
    fn generic_positional_assigns_by_canonical_order() {
        let document = "\
Schedule for the 15th\n\
04:55 06:40 12:30 15:45 18:20 19:50\n";
        let set = resolve(document, fixed_day(15)).expect("resolved");
        assert_eq!(
            set,
            PrayerTimeSet::new(
                time(4, 55),
                time(12, 30),
                time(15, 45),
                time(18, 20),
                time(19, 50)
            )
        );
    }

    #[test]
    fn strategies_never_blend_partial_results() {
        // The table row is malformed (bad Dhuhr cell), while the labeled text
        // below it is complete. The result must come wholly from the labeled
        // strategy, not mix table cells with labels.
        let document = "\
Mon, 15, —, 05h00, 06h30, 99h99, 13h00, 16h00, 18h00\n\
Fadjr 06:08 Dhohr 13:25 Asr 16:23 Maghrib 18:58 Icha 20:20\n";
        let set = resolve(document, fixed_day(15)).expect("resolved");
        assert_eq!(set.fajr, time(6, 8));
        assert_eq!(set.dhuhr, time(13, 25));
    }

    #[test]
    fn unresolvable_document_reports_resolution_failure() {
        assert!(matches!(
            resolve("nothing to see here", fixed_day(1)),
            Err(InfraError::Resolution)
        ));
    }

    #[test]
    fn time_token_scanner_ignores_long_digit_runs() {
        assert_eq!(collect_time_tokens("in 2026: 123:45 then 06:08"), vec![time(6, 8)]);
        assert_eq!(find_time_token("no times"), None);
    }
}
