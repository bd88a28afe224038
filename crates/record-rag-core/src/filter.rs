//! Applies a [`StructuredFilter`] to trip rows and renders the result.
//!
//! Filters combine conjunctively: duration bound (strict), then origin and
//! destination city (case-insensitive equality), then a stable multi-key
//! sort with the filter's first sort key as the primary key. An empty result
//! is ordinary output.

use std::cmp::Ordering;

use crate::models::TripRecord;
use crate::parser::{normalize, Comparator, Language, SortColumn, StructuredFilter};

/// Rows shown in the rendered table.
pub const TABLE_ROWS: usize = 5;

pub fn apply_filters(rows: &[TripRecord], filter: &StructuredFilter) -> Vec<TripRecord> {
    let from = filter.from_city.as_deref().map(normalize);
    let to = filter.to_city.as_deref().map(normalize);

    let mut out: Vec<TripRecord> = rows
        .iter()
        .filter(|r| match filter.duration_filter {
            Some(d) => match d.op {
                Comparator::Greater => r.avg_duration_hr > d.hours,
                Comparator::Less => r.avg_duration_hr < d.hours,
            },
            None => true,
        })
        .filter(|r| from.as_ref().map_or(true, |c| normalize(&r.from_city) == *c))
        .filter(|r| to.as_ref().map_or(true, |c| normalize(&r.to_city) == *c))
        .cloned()
        .collect();

    if !filter.sort_by.is_empty() {
        out.sort_by(|a, b| {
            filter.sort_by.iter().fold(Ordering::Equal, |acc, key| {
                acc.then_with(|| {
                    let ord = compare_column(a, b, key.column);
                    if key.ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                })
            })
        });
    }
    out
}

fn compare_column(a: &TripRecord, b: &TripRecord, column: SortColumn) -> Ordering {
    match column {
        SortColumn::AvgPriceTry => a.avg_price_try.total_cmp(&b.avg_price_try),
        SortColumn::FreqPerDay => a.freq_per_day.cmp(&b.freq_per_day),
        SortColumn::AvgDurationHr => a.avg_duration_hr.total_cmp(&b.avg_duration_hr),
    }
}

/// One-sentence description of the best row, or `None` for an empty result.
pub fn explain_top(rows: &[TripRecord], language: Language) -> Option<String> {
    let top = rows.first()?;
    Some(match language {
        Language::Turkish => format!(
            "Önerilen sefer: {} - {} arası {} firmasıyla. Ortalama süre: {} saat, fiyat: {} TL, günlük {} sefer yapılmakta.",
            top.from_city, top.to_city, top.company, top.avg_duration_hr, top.avg_price_try, top.freq_per_day
        ),
        Language::English => format!(
            "Suggested trip: {} - {} with {}. Average duration: {} h, price: {} TRY, {} departures per day.",
            top.from_city, top.to_city, top.company, top.avg_duration_hr, top.avg_price_try, top.freq_per_day
        ),
    })
}

/// GitHub-flavored markdown table of the first [`TABLE_ROWS`] rows.
pub fn markdown_table(rows: &[TripRecord]) -> String {
    let shown: Vec<[String; 6]> = rows.iter().take(TABLE_ROWS).map(|r| r.cells()).collect();

    let mut widths: Vec<usize> = TripRecord::COLUMNS.iter().map(|c| c.chars().count()).collect();
    for cells in &shown {
        for (w, cell) in widths.iter_mut().zip(cells.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut out = vec![line(TripRecord::COLUMNS.to_vec())];
    out.push(format!(
        "|{}|",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("|")
    ));
    for cells in &shown {
        out.push(line(cells.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

/// Full text for a trip table as plain text for an LLM prompt.
pub fn plain_table(rows: &[TripRecord]) -> String {
    let mut out = vec![TripRecord::COLUMNS.join("\t")];
    out.extend(rows.iter().map(|r| r.cells().join("\t")));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, DurationFilter, SortKey};

    fn trip(from: &str, to: &str, hours: f64, price: f64, freq: u32) -> TripRecord {
        TripRecord {
            from_city: from.into(),
            to_city: to.into(),
            avg_duration_hr: hours,
            avg_price_try: price,
            company: format!("{}-{}", from, to),
            freq_per_day: freq,
        }
    }

    fn rows() -> Vec<TripRecord> {
        vec![
            trip("Izmir", "Ankara", 8.0, 700.0, 10),
            trip("Istanbul", "Ankara", 5.5, 550.0, 30),
            trip("Izmir", "Istanbul", 6.0, 600.0, 20),
            trip("Antalya", "Ankara", 7.5, 550.0, 8),
        ]
    }

    #[test]
    fn test_empty_filter_keeps_rows_and_order() {
        assert_eq!(apply_filters(&rows(), &StructuredFilter::default()), rows());
    }

    #[test]
    fn test_cheapest_to_ankara() {
        let out = apply_filters(&rows(), &parse("cheapest trip to ankara"));
        let froms: Vec<&str> = out.iter().map(|r| r.from_city.as_str()).collect();
        // equal prices keep source order
        assert_eq!(froms, vec!["Istanbul", "Antalya", "Izmir"]);
    }

    #[test]
    fn test_duration_is_strict() {
        let filter = StructuredFilter {
            duration_filter: Some(DurationFilter {
                op: Comparator::Greater,
                hours: 6.0,
            }),
            ..Default::default()
        };
        let out = apply_filters(&rows(), &filter);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.avg_duration_hr > 6.0));
    }

    #[test]
    fn test_city_match_ignores_case() {
        let filter = StructuredFilter {
            from_city: Some("IZMIR".into()),
            ..Default::default()
        };
        assert_eq!(apply_filters(&rows(), &filter).len(), 2);
    }

    #[test]
    fn test_multi_key_sort() {
        let filter = StructuredFilter {
            sort_by: vec![
                SortKey {
                    column: SortColumn::AvgPriceTry,
                    ascending: true,
                },
                SortKey {
                    column: SortColumn::FreqPerDay,
                    ascending: false,
                },
            ],
            ..Default::default()
        };
        let out = apply_filters(&rows(), &filter);
        let freqs: Vec<u32> = out.iter().map(|r| r.freq_per_day).collect();
        assert_eq!(freqs, vec![30, 8, 20, 10]);
    }

    #[test]
    fn test_question_for_antalya_finds_its_route() {
        let rows = vec![
            trip("Ankara", "Antalya", 7.0, 600.0, 12),
            trip("Istanbul", "Antalya", 10.0, 850.0, 6),
            trip("Istanbul", "Ankara", 6.0, 550.0, 24),
        ];
        let out = apply_filters(&rows, &parse("cheapest trip to Antalya"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].from_city, "Ankara");
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let out = apply_filters(&rows(), &parse("trips from trabzon"));
        assert!(out.is_empty());
        assert!(explain_top(&out, Language::English).is_none());
    }

    #[test]
    fn test_explanation_and_table() {
        let out = apply_filters(&rows(), &parse("en ucuz ankara'ya sefer"));
        let text = explain_top(&out, Language::Turkish).unwrap();
        assert!(text.contains("Istanbul - Ankara"));

        let table = markdown_table(&out);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2 + out.len());
        assert!(lines[0].starts_with("| from_city"));
        assert!(lines[1].starts_with("|---"));
    }

    #[test]
    fn test_table_caps_rows() {
        let many: Vec<TripRecord> = (0..9).map(|i| trip("A", "B", 1.0, i as f64, 1)).collect();
        assert_eq!(markdown_table(&many).lines().count(), 2 + TABLE_ROWS);
    }
}
