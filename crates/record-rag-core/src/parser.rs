//! Rule-based natural-language → [`StructuredFilter`] extraction.
//!
//! Understands English and Turkish trip questions. The parser is an ordered
//! list of independent rules; each looks at the lower-cased question and may
//! produce one [`FilterClause`]. Clauses are folded left to right:
//!
//! 1. duration "greater than" (`longer than 5`, `5 saatten uzun`)
//! 2. duration "less than" (`shorter than 3`, `3 saatten az`)
//! 3. origin city, English then Turkish (`from izmir`, `izmir'den`)
//! 4. destination city, English then Turkish (`to ankara`, `ankara'ya`)
//! 5. sort keywords in fixed priority: price ascending, price descending,
//!    frequency descending, duration descending, duration ascending
//!
//! Turkish suffixes are matched per word. `ankara'ya` and `istanbul'a` are
//! read first; the bare `ankaraya` form is only tried in Turkish questions,
//! so a city like Antalya is not cut at its own trailing `ya` in English.
//!
//! Duration and city clauses overwrite an earlier clause for the same key, so
//! a question matching both duration rules keeps the "less than" bound, and a
//! Turkish city phrase beats an English one. Sort clauses accumulate in the
//! priority order above, not in the order the words appear in the question.
//! A question that matches nothing yields an empty filter, meaning "no
//! filtering".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const LETTERS: &str = "a-zçğıöşü";

/// Words that end an English city phrase (`from izmir to ankara`).
const CITY_STOP_WORDS: &[&str] = &[
    "to", "from", "with", "in", "on", "at", "by", "and", "or", "for", "under", "over", "that",
    "which", "than", "via", "using", "please", "longer", "shorter", "more", "less", "greater",
    "smaller", "cheapest", "fastest", "longest", "most", "trip", "trips", "bus", "buses",
    "hour", "hours",
];

/// Turkish words that end like a case suffix but never name a city.
const SUFFIX_STOP_WORDS: &[&str] = &[
    "neden", "nereden", "nereye", "hangisinden", "hangisine", "bundan", "ondan", "şundan",
    "buraya", "oraya", "sonra", "daha",
];

/// Shortest stem a bare (apostrophe-less) suffix may leave behind.
const MIN_BARE_STEM: usize = 3;

static PARSER: Lazy<FilterParser> = Lazy::new(FilterParser::new);

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("static pattern"));

/// Strict comparison applied to `avg_duration_hr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::Less => "<",
        }
    }
}

/// Columns a trip table can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    AvgPriceTry,
    FreqPerDay,
    AvgDurationHr,
}

impl SortColumn {
    pub fn name(self) -> &'static str {
        match self {
            SortColumn::AvgPriceTry => "avg_price_try",
            SortColumn::FreqPerDay => "freq_per_day",
            SortColumn::AvgDurationHr => "avg_duration_hr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub column: SortColumn,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationFilter {
    pub op: Comparator,
    pub hours: f64,
}

/// Parsed filter and sort instructions for the trip table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuredFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_filter: Option<DurationFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_city: Option<String>,
    /// Sort keys, primary first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort_by: Vec<SortKey>,
}

impl StructuredFilter {
    pub fn is_empty(&self) -> bool {
        self.duration_filter.is_none()
            && self.from_city.is_none()
            && self.to_city.is_none()
            && self.sort_by.is_empty()
    }

    fn apply(&mut self, clause: FilterClause) {
        match clause {
            FilterClause::Duration(d) => self.duration_filter = Some(d),
            FilterClause::FromCity(c) => self.from_city = Some(c),
            FilterClause::ToCity(c) => self.to_city = Some(c),
            FilterClause::Sort(k) => self.sort_by.push(k),
        }
    }
}

/// One extracted instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Duration(DurationFilter),
    FromCity(String),
    ToCity(String),
    Sort(SortKey),
}

#[derive(Debug, Clone, Copy)]
enum CityKey {
    From,
    To,
}

impl CityKey {
    fn clause(self, city: String) -> FilterClause {
        match self {
            CityKey::From => FilterClause::FromCity(city),
            CityKey::To => FilterClause::ToCity(city),
        }
    }
}

#[derive(Debug)]
enum Rule {
    /// The first number inside the matched span is the bound.
    Duration { pattern: Regex, op: Comparator },
    /// Capture group 1 is the city phrase, cut at the first connector word.
    City { pattern: Regex, key: CityKey },
    /// Turkish case suffix on a single word. Apostrophe forms (`izmir'den`)
    /// win over bare forms (`izmirden`), which only count in Turkish questions.
    Suffix {
        marked: &'static [&'static str],
        bare: &'static [&'static str],
        key: CityKey,
    },
    /// Any phrase occurring as a substring fires the rule.
    Keyword {
        phrases: &'static [&'static str],
        key: SortKey,
    },
}

impl Rule {
    fn extract(&self, text: &str) -> Option<FilterClause> {
        match self {
            Rule::Duration { pattern, op } => {
                let span = pattern.find(text)?;
                let number = NUMBER.find(span.as_str())?;
                let hours: f64 = number.as_str().replace(',', ".").parse().ok()?;
                Some(FilterClause::Duration(DurationFilter { op: *op, hours }))
            }
            Rule::City { pattern, key } => {
                let raw = pattern.captures(text)?.get(1)?.as_str();
                let words: Vec<&str> = raw
                    .split_whitespace()
                    .take_while(|w| !CITY_STOP_WORDS.contains(w))
                    .collect();
                if words.is_empty() {
                    return None;
                }
                Some(key.clause(title_case(&words.join(" "))))
            }
            Rule::Suffix { marked, bare, key } => {
                let stem = marked_stem(text, marked).or_else(|| bare_stem(text, bare))?;
                Some(key.clause(title_case(stem)))
            }
            Rule::Keyword { phrases, key } => phrases
                .iter()
                .any(|p| text.contains(p))
                .then_some(FilterClause::Sort(*key)),
        }
    }
}

/// Ordered rule chain. Build once and reuse; [`parse`] uses a shared instance.
#[derive(Debug)]
pub struct FilterParser {
    rules: Vec<Rule>,
}

impl Default for FilterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterParser {
    pub fn new() -> Self {
        let num = r"\d+(?:[.,]\d+)?";
        let re = |p: String| Regex::new(&p).expect("static pattern");
        let sort = |column, ascending| SortKey { column, ascending };

        let rules = vec![
            Rule::Duration {
                pattern: re(format!(
                    r"(?:longer|more|greater) than\s*{num}|uzun.*?{num}|{num}\s*saat.*(?:uzun|fazla)"
                )),
                op: Comparator::Greater,
            },
            Rule::Duration {
                pattern: re(format!(
                    r"(?:shorter|less|smaller) than\s*{num}|kısa.*?{num}|{num}\s*saat.*(?:az|kısa)"
                )),
                op: Comparator::Less,
            },
            Rule::City {
                pattern: re(format!(r"\bfrom\s+([{LETTERS}]+(?:\s+[{LETTERS}]+)*)")),
                key: CityKey::From,
            },
            Rule::Suffix {
                marked: &["dan", "den", "tan", "ten"],
                bare: &["dan", "den"],
                key: CityKey::From,
            },
            Rule::City {
                pattern: re(format!(r"\bto\s+([{LETTERS}]+(?:\s+[{LETTERS}]+)*)")),
                key: CityKey::To,
            },
            Rule::Suffix {
                marked: &["ya", "ye", "a", "e"],
                bare: &["ya", "ye"],
                key: CityKey::To,
            },
            Rule::Keyword {
                phrases: &["cheapest", "en ucuz"],
                key: sort(SortColumn::AvgPriceTry, true),
            },
            Rule::Keyword {
                phrases: &["most expensive", "en pahalı", "en pahali"],
                key: sort(SortColumn::AvgPriceTry, false),
            },
            Rule::Keyword {
                phrases: &["most frequent", "en sık", "en sik"],
                key: sort(SortColumn::FreqPerDay, false),
            },
            Rule::Keyword {
                phrases: &["longest", "en uzun"],
                key: sort(SortColumn::AvgDurationHr, false),
            },
            Rule::Keyword {
                phrases: &["fastest", "en kısa", "en kisa"],
                key: sort(SortColumn::AvgDurationHr, true),
            },
        ];
        Self { rules }
    }

    /// Every clause the rules extract from `text`, in rule order.
    pub fn clauses(&self, text: &str) -> Vec<FilterClause> {
        let normalized = normalize(text);
        self.rules
            .iter()
            .filter_map(|rule| rule.extract(&normalized))
            .collect()
    }

    pub fn parse(&self, text: &str) -> StructuredFilter {
        self.clauses(text)
            .into_iter()
            .fold(StructuredFilter::default(), |mut filter, clause| {
                filter.apply(clause);
                filter
            })
    }
}

/// Parse a question with the shared rule chain.
pub fn parse(text: &str) -> StructuredFilter {
    PARSER.parse(text)
}

/// Language of a question, used to pick the answer prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Turkish,
}

impl Language {
    /// Turkish when the question carries Turkish letters or phrasing the
    /// parser understands, English otherwise.
    pub fn detect(text: &str) -> Self {
        const MARKERS: &[&str] = &[
            "saat", "sefer", "hangi", "nedir", "kaç", "en ucuz", "en pahali", "en sik",
            "en uzun", "en kisa", "'dan", "'den", "'ya", "'ye",
        ];
        let normalized = normalize(text);
        if normalized.chars().any(|c| "çğıöşü".contains(c))
            || MARKERS.iter().any(|m| normalized.contains(m))
        {
            Language::Turkish
        } else {
            Language::English
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|w| !w.is_empty())
}

/// Stem of the first word written as `<stem>'<suffix>`.
fn marked_stem<'a>(text: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    words(text).find_map(|word| {
        let (stem, suffix) = word.split_once('\'')?;
        (!stem.is_empty() && suffixes.contains(&suffix)).then_some(stem)
    })
}

/// Stem of the first word carrying a bare suffix. A city named right after
/// `to`/`from` belongs to the English phrase and is left whole.
fn bare_stem<'a>(text: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    if Language::detect(text) != Language::Turkish {
        return None;
    }
    let tokens: Vec<&str> = words(text).collect();
    tokens.iter().enumerate().find_map(|(i, word)| {
        if word.contains('\'')
            || SUFFIX_STOP_WORDS.contains(word)
            || (i > 0 && matches!(tokens[i - 1], "to" | "from"))
        {
            return None;
        }
        suffixes
            .iter()
            .find_map(|suffix| word.strip_suffix(suffix))
            .filter(|stem| stem.chars().count() >= MIN_BARE_STEM)
    })
}

pub(crate) fn normalize(text: &str) -> String {
    text.replace('İ', "i").replace('’', "'").to_lowercase()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
