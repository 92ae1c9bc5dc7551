//! Natural language to [`QueryPlan`].
//!
//! Translation is a sequence of passes over the query's tokens. Each pass
//! claims the tokens it recognises so later passes never see them again:
//!
//! 1. ordering phrases ("sorted by salary")
//! 2. numeric and temporal qualifiers ("over 100000", "hired in 2021")
//! 3. "named X" qualifiers
//! 4. aggregate, ranking and recency cues ("average", "top 5", "most recent")
//! 5. grouping phrases ("by department", "per team")
//! 6. the entity noun, resolved to a table
//! 7. qualifier values matched against sampled column values
//! 8. column mentions, which feed measure, date and filter resolution
//!
//! Every phrase table is an ordered list of `(phrase, effect)` pairs.
//! Longer phrases come first so "most recent" is claimed before "most".
//!
//! Literal values never reach SQL text: they become [`Predicate`] values
//! which [`crate::sql::render`] binds as parameters.

use chrono::{Datelike, Utc};

use crate::error::{Error, Result};
use crate::models::{
    Aggregate, AggregateFn, ColumnProfile, ColumnRef, GroupBy, Join, Operator, OrderBy,
    OrderTarget, PlanKind, Predicate, QueryPlan, SchemaGraph, SemanticRole, SortDirection,
    SqlValue, TableProfile,
};
use crate::text::{edit_distance, identifier_parts, is_stopword, singular, tokenize, word_matches, Token};

/// What a cue phrase contributes to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Aggregate(AggregateFn),
    /// Rank rows by a numeric measure.
    Rank(SortDirection),
    /// Order rows by a date column.
    Recency(SortDirection),
}

use crate::models::AggregateFn::{Avg, Count, Max, Min, Sum};
use crate::models::SortDirection::{Asc, Desc};

/// Aggregate and ordering cues. The first cue of each kind wins.
pub const CUE_RULES: &[(&str, Cue)] = &[
    ("how many", Cue::Aggregate(Count)),
    ("number of", Cue::Aggregate(Count)),
    ("most recently", Cue::Recency(Desc)),
    ("most recent", Cue::Recency(Desc)),
    ("count", Cue::Aggregate(Count)),
    ("average", Cue::Aggregate(Avg)),
    ("avg", Cue::Aggregate(Avg)),
    ("mean", Cue::Aggregate(Avg)),
    ("total", Cue::Aggregate(Sum)),
    ("sum", Cue::Aggregate(Sum)),
    ("maximum", Cue::Aggregate(Max)),
    ("max", Cue::Aggregate(Max)),
    ("minimum", Cue::Aggregate(Min)),
    ("min", Cue::Aggregate(Min)),
    ("latest", Cue::Recency(Desc)),
    ("newest", Cue::Recency(Desc)),
    ("recent", Cue::Recency(Desc)),
    ("oldest", Cue::Recency(Asc)),
    ("earliest", Cue::Recency(Asc)),
    ("highest", Cue::Rank(Desc)),
    ("top", Cue::Rank(Desc)),
    ("largest", Cue::Rank(Desc)),
    ("biggest", Cue::Rank(Desc)),
    ("most", Cue::Rank(Desc)),
    ("lowest", Cue::Rank(Asc)),
    ("smallest", Cue::Rank(Asc)),
    ("bottom", Cue::Rank(Asc)),
    ("least", Cue::Rank(Asc)),
];

/// Comparison phrases followed by a number. The flag marks phrases that
/// only make sense against a date ("after 2020").
pub const COMPARISON_RULES: &[(&str, Operator, bool)] = &[
    ("more than", Operator::Gt, false),
    ("greater than", Operator::Gt, false),
    ("higher than", Operator::Gt, false),
    ("larger than", Operator::Gt, false),
    ("at least", Operator::Gte, false),
    ("less than", Operator::Lt, false),
    ("lower than", Operator::Lt, false),
    ("fewer than", Operator::Lt, false),
    ("at most", Operator::Lte, false),
    ("equal to", Operator::Eq, false),
    ("over", Operator::Gt, false),
    ("above", Operator::Gt, false),
    ("exceeding", Operator::Gt, false),
    ("under", Operator::Lt, false),
    ("below", Operator::Lt, false),
    ("exactly", Operator::Eq, false),
    ("after", Operator::Gt, true),
    ("since", Operator::Gte, true),
    ("before", Operator::Lt, true),
];

pub const ORDER_PHRASES: &[&str] = &["ordered by", "order by", "sorted by", "sort by"];

pub const GROUP_PHRASES: &[&str] = &[
    "group by",
    "grouped by",
    "broken down by",
    "for each",
    "in each",
    "per",
    "by",
    "each",
];

const LIMIT_PHRASES: &[&str] = &["first", "limit"];
const YEAR_PHRASES: &[&str] = &["in", "during"];
const NAME_PHRASES: &[&str] = &["named", "called"];
/// Words that introduce a qualifier: the word after them must resolve.
const QUALIFIER_WORDS: &[&str] = &["in", "with", "of", "from", "at", "for", "where"];

/// Synonym groups for entity and column matching. A word matches a table
/// or column when both appear in the same group.
pub const SYNONYMS: &[&[&str]] = &[
    &["employee", "emp", "staff", "personnel", "worker", "workforce"],
    &["department", "dept", "division", "unit", "team"],
    &[
        "salary", "compensation", "pay", "paid", "wage", "income", "earnings", "earn", "earner",
        "make",
    ],
    &["hire", "hired", "hiring", "join", "joined", "start", "started"],
    &["position", "role", "title", "job"],
    &["manager", "supervisor", "boss"],
];

/// Words that carry no meaning for translation beyond the stopword list.
const QUERY_NOISE: &[&str] = &[
    "show", "list", "find", "give", "get", "display", "tell", "return", "fetch", "me", "every",
    "please", "whose", "many", "much", "than", "i", "want", "see", "about", "those", "these",
    "some", "only", "just", "been", "being", "rows", "records", "desc", "asc", "descending",
    "ascending", "us", "everyone", "s",
];

fn is_noise(word: &str) -> bool {
    is_stopword(word) || QUERY_NOISE.contains(&word)
}

fn phrase_len(phrase: &str) -> usize {
    phrase.split(' ').count()
}

fn in_same_group(word: &str, names: &[String]) -> bool {
    SYNONYMS.iter().any(|group| {
        group.iter().any(|g| singular(g) == word)
            && group
                .iter()
                .any(|g| names.iter().any(|n| singular(g) == *n))
    })
}

/// Tunables supplied by configuration.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// Row bound for list queries without an explicit count.
    pub default_limit: u64,
    /// N for "highest"/"top" phrasing without a number.
    pub top_n: u64,
    /// Anchor for "this year" and "last year".
    pub current_year: i32,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            default_limit: 1000,
            top_n: 5,
            current_year: Utc::now().year(),
        }
    }
}

/// Translate with default options.
pub fn translate(text: &str, schema: &SchemaGraph) -> Result<QueryPlan> {
    Translator::new(schema, TranslateOptions::default()).translate(text)
}

/// A rule-based translator bound to one schema snapshot.
pub struct Translator<'a> {
    schema: &'a SchemaGraph,
    options: TranslateOptions,
}

// ─── Token scanning ─────────────────────────────────────────────────

struct Comparison {
    op: Operator,
    number: String,
    at: usize,
    temporal: bool,
}

#[derive(Default)]
struct Intent {
    aggregate: Option<AggregateFn>,
    rank: Option<SortDirection>,
    recency: Option<SortDirection>,
    limit: Option<u64>,
    group: Option<usize>,
    order: Option<(usize, SortDirection)>,
    comparisons: Vec<Comparison>,
    years: Vec<i32>,
    named: Option<String>,
}

struct Scan {
    tokens: Vec<Token>,
    used: Vec<bool>,
}

impl Scan {
    fn new(text: &str) -> Self {
        let tokens = tokenize(text);
        let used = vec![false; tokens.len()];
        Self { tokens, used }
    }

    fn is_free(&self, i: usize) -> bool {
        i < self.tokens.len() && !self.used[i]
    }

    fn claim(&mut self, start: usize, len: usize) {
        for flag in self.used.iter_mut().skip(start).take(len) {
            *flag = true;
        }
    }

    /// First occurrence of `phrase` at or after `from` made of free tokens.
    fn find_from(&self, phrase: &str, from: usize) -> Option<usize> {
        let parts: Vec<&str> = phrase.split(' ').collect();
        if parts.len() > self.tokens.len() {
            return None;
        }
        (from..=self.tokens.len() - parts.len()).find(|&s| {
            parts
                .iter()
                .enumerate()
                .all(|(k, p)| self.is_free(s + k) && word_matches(&self.tokens[s + k].lower, p))
        })
    }

    fn find(&self, phrase: &str) -> Option<usize> {
        self.find_from(phrase, 0)
    }

    fn integer_at(&self, i: usize) -> Option<u64> {
        if !self.is_free(i) {
            return None;
        }
        self.tokens[i].lower.parse::<u64>().ok()
    }

    fn number_at(&self, i: usize) -> Option<String> {
        (self.is_free(i) && self.tokens[i].is_number()).then(|| self.tokens[i].lower.clone())
    }

    fn year_at(&self, i: usize) -> Option<i32> {
        let n = self.integer_at(i)?;
        (self.tokens[i].lower.len() == 4 && (1000..=9999).contains(&n)).then_some(n as i32)
    }

    /// The next free content word at or after `from`, skipping free noise.
    /// Stops at the first claimed token.
    fn next_content(&self, from: usize) -> Option<usize> {
        let mut i = from;
        while self.is_free(i) {
            let t = &self.tokens[i];
            if !is_noise(&t.lower) && !t.is_number() {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn is_content(&self, i: usize) -> bool {
        self.is_free(i) && !is_noise(&self.tokens[i].lower) && !self.tokens[i].is_number()
    }

    /// Whether the word at `i` reads as a reference to data rather than
    /// filler: a capitalised word past the first, a word after a qualifier
    /// ("in Marketing"), or an attribute ahead of "of" ("bonus of").
    fn is_qualifier_term(&self, i: usize) -> bool {
        let capitalised =
            i > 0 && self.tokens[i].raw.chars().next().is_some_and(char::is_uppercase);
        let after_qualifier =
            i > 0 && QUALIFIER_WORDS.contains(&self.tokens[i - 1].lower.as_str());
        let before_of = self.tokens.get(i + 1).is_some_and(|t| t.lower == "of");
        capitalised || after_qualifier || before_of
    }

    fn read_intent(&mut self, current_year: i32) -> Intent {
        let mut intent = Intent::default();
        self.read_order(&mut intent);
        self.read_comparisons(&mut intent);
        self.read_years(&mut intent, current_year);
        self.read_named(&mut intent);
        self.read_cues(&mut intent);
        self.read_limit(&mut intent);
        self.read_group(&mut intent);
        intent
    }

    fn read_order(&mut self, intent: &mut Intent) {
        for phrase in ORDER_PHRASES {
            let Some(s) = self.find(phrase) else { continue };
            let Some(term) = self.next_content(s + phrase_len(phrase)) else {
                continue;
            };
            self.claim(s, term + 1 - s);
            let mut direction = Asc;
            if self.is_free(term + 1) {
                match self.tokens[term + 1].lower.as_str() {
                    "desc" | "descending" => {
                        direction = Desc;
                        self.claim(term + 1, 1);
                    }
                    "asc" | "ascending" => self.claim(term + 1, 1),
                    _ => {}
                }
            }
            intent.order = Some((term, direction));
            return;
        }
    }

    fn read_comparisons(&mut self, intent: &mut Intent) {
        for &(phrase, op, temporal) in COMPARISON_RULES {
            let len = phrase_len(phrase);
            let mut from = 0;
            while let Some(s) = self.find_from(phrase, from) {
                if let Some(number) = self.number_at(s + len) {
                    self.claim(s, len + 1);
                    intent.comparisons.push(Comparison {
                        op,
                        number,
                        at: s,
                        temporal,
                    });
                }
                from = s + 1;
            }
        }
        intent.comparisons.sort_by_key(|c| c.at);
    }

    fn read_years(&mut self, intent: &mut Intent, current_year: i32) {
        for (phrase, year) in [("this year", current_year), ("last year", current_year - 1)] {
            if let Some(s) = self.find(phrase) {
                self.claim(s, 2);
                intent.years.push(year);
            }
        }
        for phrase in YEAR_PHRASES {
            let mut from = 0;
            while let Some(s) = self.find_from(phrase, from) {
                if let Some(year) = self.year_at(s + 1) {
                    self.claim(s, 2);
                    intent.years.push(year);
                }
                from = s + 1;
            }
        }
    }

    fn read_named(&mut self, intent: &mut Intent) {
        for phrase in NAME_PHRASES {
            let Some(s) = self.find(phrase) else { continue };
            if !self.is_content(s + 1) {
                continue;
            }
            let mut value = self.tokens[s + 1].raw.clone();
            let mut len = 2;
            let capitalised = |t: &Token| t.raw.chars().next().is_some_and(char::is_uppercase);
            if self.is_free(s + 2) && capitalised(&self.tokens[s + 2]) {
                value.push(' ');
                value.push_str(&self.tokens[s + 2].raw);
                len = 3;
            }
            self.claim(s, len);
            intent.named = Some(value);
            return;
        }
    }

    fn read_cues(&mut self, intent: &mut Intent) {
        for &(phrase, cue) in CUE_RULES {
            let len = phrase_len(phrase);
            let mut from = 0;
            while let Some(s) = self.find_from(phrase, from) {
                self.claim(s, len);
                match cue {
                    Cue::Aggregate(f) => {
                        intent.aggregate.get_or_insert(f);
                    }
                    Cue::Rank(d) => {
                        intent.rank.get_or_insert(d);
                        self.take_count(s, len, intent);
                    }
                    Cue::Recency(d) => {
                        intent.recency.get_or_insert(d);
                        self.take_count(s, len, intent);
                    }
                }
                from = s + len;
            }
        }
    }

    /// "top 5" or "5 highest": claim the adjacent number as the row count.
    fn take_count(&mut self, start: usize, len: usize, intent: &mut Intent) {
        let after = start + len;
        let at = if self.integer_at(after).is_some() {
            Some(after)
        } else if start > 0 && self.integer_at(start - 1).is_some() {
            Some(start - 1)
        } else {
            None
        };
        if let Some(i) = at {
            if intent.limit.is_none() {
                intent.limit = self.integer_at(i);
            }
            self.claim(i, 1);
        }
    }

    fn read_limit(&mut self, intent: &mut Intent) {
        for phrase in LIMIT_PHRASES {
            if let Some(s) = self.find(phrase) {
                if let Some(n) = self.integer_at(s + 1) {
                    self.claim(s, 2);
                    intent.limit.get_or_insert(n);
                }
            }
        }
    }

    fn read_group(&mut self, intent: &mut Intent) {
        for phrase in GROUP_PHRASES {
            let Some(s) = self.find(phrase) else { continue };
            let Some(term) = self.next_content(s + phrase_len(phrase)) else {
                continue;
            };
            self.claim(s, term + 1 - s);
            intent.group = Some(term);
            return;
        }
    }
}

// ─── Matching ───────────────────────────────────────────────────────

/// How well `token` names `table`: lower is better, `None` is no match.
fn table_match(token: &Token, table: &TableProfile) -> Option<(u8, usize)> {
    let word = singular(&token.lower);
    let name = table.name.to_lowercase();
    let name_singular = singular(&name);
    let distance = edit_distance(&token.lower, &name);
    if word == name_singular {
        return Some((0, distance));
    }
    let parts: Vec<String> = identifier_parts(&table.name)
        .iter()
        .map(|p| singular(p))
        .collect();
    if in_same_group(&word, &[name_singular.clone()]) || in_same_group(&word, &parts) {
        return Some((1, distance));
    }
    let substring = (word.len() >= 3 && name_singular.contains(&word))
        || (name_singular.len() >= 3 && word.contains(&name_singular));
    substring.then_some((2, distance))
}

/// How well `token` names `column`: 0 exact, 1 name part, 2 synonym.
fn column_match(token: &Token, column: &ColumnProfile) -> Option<u8> {
    let word = singular(&token.lower);
    if word == singular(&column.name) {
        return Some(0);
    }
    let parts: Vec<String> = identifier_parts(&column.name)
        .iter()
        .filter(|p| p.as_str() != "id")
        .map(|p| singular(p))
        .collect();
    if parts.contains(&word) {
        return Some(1);
    }
    let mut names = parts;
    names.push(singular(&column.name));
    in_same_group(&word, &names).then_some(2)
}

fn best_column<'t>(token: &Token, table: &'t TableProfile) -> Option<&'t ColumnProfile> {
    table
        .columns
        .iter()
        .filter_map(|c| column_match(token, c).map(|d| (d, c)))
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

struct Mention<'a> {
    at: usize,
    column: &'a ColumnProfile,
}

/// Dates are compared as ISO-8601 text, so "after 2020" becomes
/// `>= '2021-01-01'`.
fn date_value(query: &str, op: Operator, year: i32) -> Result<(Operator, SqlValue)> {
    if !(1000..=9998).contains(&year) {
        return Err(Error::unsupported(query, format!("'{}' is not a year", year)));
    }
    let start = |y: i32| SqlValue::Text(format!("{:04}-01-01", y));
    Ok(match op {
        Operator::Gt => (Operator::Gte, start(year + 1)),
        Operator::Gte => (Operator::Gte, start(year)),
        Operator::Lt => (Operator::Lt, start(year)),
        Operator::Lte => (Operator::Lt, start(year + 1)),
        Operator::Eq | Operator::YearEq => (Operator::YearEq, SqlValue::Text(year.to_string())),
    })
}

fn number_value(number: &str) -> SqlValue {
    match number.parse::<i64>() {
        Ok(i) => SqlValue::Integer(i),
        Err(_) => number
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(number.to_string())),
    }
}

fn column_ref(column: &ColumnProfile) -> ColumnRef {
    ColumnRef::new(&column.table, &column.name)
}

fn push_join(joins: &mut Vec<Join>, join: Join) {
    if !joins.contains(&join) {
        joins.push(join);
    }
}

impl<'a> Translator<'a> {
    pub fn new(schema: &'a SchemaGraph, options: TranslateOptions) -> Self {
        Self { schema, options }
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    /// Translate `text` into a plan over this translator's schema.
    ///
    /// Fails with [`Error::UnsupportedQuery`] when no table can be resolved
    /// for the entity, or when a referenced column (a measure to aggregate,
    /// a grouping or ordering term) has no match in the schema. A qualifier
    /// such as "in Marketing" that matches no sampled value fails the same
    /// way instead of being dropped.
    pub fn translate(&self, text: &str) -> Result<QueryPlan> {
        let mut scan = Scan::new(text);
        if scan.tokens.is_empty() {
            return Err(Error::unsupported(text, "query contains no words"));
        }
        let intent = scan.read_intent(self.options.current_year);
        let table = self.resolve_table(text, &mut scan)?;

        let mut plan = QueryPlan::list(&table.name);
        self.match_values(&mut scan, table, &mut plan);
        let mentions = self.mentions(&scan, table);
        self.match_column_values(&mut scan, table, &mentions, &mut plan);
        let unresolved: Vec<&str> = (0..scan.tokens.len())
            .filter(|&i| scan.is_content(i) && !mentions.iter().any(|m| m.at == i))
            .map(|i| scan.tokens[i].raw.as_str())
            .collect();
        if let Some(i) = (0..scan.tokens.len()).find(|&i| {
            scan.is_content(i) && !mentions.iter().any(|m| m.at == i) && scan.is_qualifier_term(i)
        }) {
            return Err(Error::unsupported(
                text,
                format!(
                    "no column or value of '{}' matches '{}'",
                    table.name, scan.tokens[i].raw
                ),
            ));
        }

        for cmp in &intent.comparisons {
            let predicate = self.comparison(text, cmp, table, &mentions, &unresolved)?;
            plan.filters.push(predicate);
        }
        for &year in &intent.years {
            let column = self.date_column(text, table, &mentions)?;
            plan.filters.push(Predicate {
                column: column_ref(column),
                op: Operator::YearEq,
                value: SqlValue::Text(year.to_string()),
            });
        }
        if let Some(name) = &intent.named {
            let column = table
                .columns_with_role(SemanticRole::Name)
                .next()
                .ok_or_else(|| {
                    Error::unsupported(text, format!("table '{}' has no name column", table.name))
                })?;
            plan.filters.push(Predicate {
                column: column_ref(column),
                op: Operator::Eq,
                value: SqlValue::Text(name.clone()),
            });
        }

        // "top 5 employees by salary" ranks rather than groups.
        let mut by_measure = None;
        let group = match intent.group {
            Some(i) => match best_column(&scan.tokens[i], table) {
                Some(c) if c.role == SemanticRole::NumericMeasure && intent.aggregate.is_none() => {
                    by_measure = Some(c);
                    None
                }
                _ => Some(self.resolve_group(text, &scan.tokens[i], table, &mut plan.joins)?),
            },
            None => None,
        };

        let func = intent
            .aggregate
            .or_else(|| group.as_ref().map(|_| AggregateFn::Count));
        let aggregate = match func {
            Some(AggregateFn::Count) => Some(Aggregate {
                func: AggregateFn::Count,
                column: None,
            }),
            Some(func) => {
                let measure = self.measure(text, table, &mentions, &unresolved, "aggregate")?;
                Some(Aggregate {
                    func,
                    column: Some(column_ref(measure)),
                })
            }
            None => None,
        };

        let order_by = match (intent.order, intent.rank, intent.recency) {
            (Some((i, direction)), _, _) => {
                let term = &scan.tokens[i];
                let column = best_column(term, table).ok_or_else(|| {
                    Error::unsupported(
                        text,
                        format!("no column of '{}' matches '{}'", table.name, term.raw),
                    )
                })?;
                Some(OrderBy {
                    target: OrderTarget::Column(column_ref(column)),
                    direction,
                })
            }
            (None, Some(direction), _) if aggregate.is_some() => group.as_ref().map(|_| OrderBy {
                target: OrderTarget::Aggregate,
                direction,
            }),
            (None, Some(direction), _) => {
                let measure = match by_measure {
                    Some(c) => c,
                    None => self.measure(text, table, &mentions, &unresolved, "rank by")?,
                };
                Some(OrderBy {
                    target: OrderTarget::Column(column_ref(measure)),
                    direction,
                })
            }
            (None, None, Some(direction)) if aggregate.is_none() => {
                let column = self.date_column(text, table, &mentions)?;
                Some(OrderBy {
                    target: OrderTarget::Column(column_ref(column)),
                    direction,
                })
            }
            _ => match (&group, &aggregate) {
                (Some(g), _) => Some(OrderBy {
                    target: OrderTarget::Column(g.column.clone()),
                    direction: Asc,
                }),
                (None, None) => by_measure.or_else(|| table.primary_identifier()).map(|c| {
                    OrderBy {
                        target: OrderTarget::Column(column_ref(c)),
                        direction: Asc,
                    }
                }),
                (None, Some(_)) => None,
            },
        };

        let kind = match func {
            Some(AggregateFn::Count) => PlanKind::Count,
            Some(_) => PlanKind::Aggregate,
            None if intent.rank.is_some() => PlanKind::TopN,
            None => PlanKind::List,
        };
        let limit = match kind {
            PlanKind::TopN => Some(intent.limit.unwrap_or(self.options.top_n)),
            PlanKind::List => Some(intent.limit.unwrap_or(self.options.default_limit)),
            _ if group.is_some() && intent.rank.is_some() => {
                Some(intent.limit.unwrap_or(self.options.top_n))
            }
            _ if group.is_some() => intent.limit,
            _ => None,
        };

        plan.kind = kind;
        plan.aggregate = aggregate;
        plan.group_by = group;
        plan.order_by = order_by;
        plan.limit = limit;
        Ok(plan)
    }

    /// Resolve the entity noun to a table, falling back to the table that
    /// owns the most mentioned columns.
    fn resolve_table(&self, text: &str, scan: &mut Scan) -> Result<&'a TableProfile> {
        let mut best: Option<((u8, usize, usize, usize), usize)> = None;
        for (ti, table) in self.schema.tables.iter().enumerate() {
            for i in 0..scan.tokens.len() {
                if !scan.is_content(i) {
                    continue;
                }
                if let Some((class, distance)) = table_match(&scan.tokens[i], table) {
                    let key = (class, distance, ti, i);
                    if best.as_ref().map_or(true, |(k, _)| key < *k) {
                        best = Some((key, ti));
                    }
                }
            }
        }
        if let Some(((_, _, _, token), ti)) = best {
            scan.claim(token, 1);
            return Ok(&self.schema.tables[ti]);
        }

        let mut by_columns: Option<(usize, usize)> = None;
        for (ti, table) in self.schema.tables.iter().enumerate() {
            let hits = self.mentions(scan, table).len();
            if hits > 0 && by_columns.map_or(true, |(h, _)| hits > h) {
                by_columns = Some((hits, ti));
            }
        }
        if let Some((_, ti)) = by_columns {
            return Ok(&self.schema.tables[ti]);
        }
        if self.schema.tables.len() == 1 {
            return Ok(&self.schema.tables[0]);
        }

        let reason = match (0..scan.tokens.len()).find(|&i| scan.is_content(i)) {
            Some(i) => format!("no table matches '{}'", scan.tokens[i].raw),
            None => "no table is referenced".to_string(),
        };
        Err(Error::unsupported(text, reason))
    }

    fn mentions<'t>(&self, scan: &Scan, table: &'t TableProfile) -> Vec<Mention<'t>> {
        (0..scan.tokens.len())
            .filter(|&i| scan.is_content(i))
            .filter_map(|i| {
                best_column(&scan.tokens[i], table).map(|column| Mention { at: i, column })
            })
            .collect()
    }

    /// Filterable columns of `table` and of tables one relationship away.
    fn filter_targets(&self, table: &'a TableProfile) -> Vec<(&'a ColumnProfile, Option<Join>)> {
        let mut out: Vec<(&ColumnProfile, Option<Join>)> = table
            .columns
            .iter()
            .filter(|c| !c.sample_values.is_empty())
            .map(|c| (c, None))
            .collect();
        for rel in self.schema.relationships_from(&table.name) {
            let Some(target) = self.schema.table(&rel.to_table) else {
                continue;
            };
            let join = Join {
                table: target.name.clone(),
                from: ColumnRef::new(&table.name, &rel.from_column),
                to: ColumnRef::new(&target.name, &rel.to_column),
            };
            for column in target.columns.iter().filter(|c| !c.sample_values.is_empty()) {
                out.push((column, Some(join.clone())));
            }
        }
        out
    }

    /// Match runs of up to three free words against sampled values.
    fn match_values(&self, scan: &mut Scan, table: &'a TableProfile, plan: &mut QueryPlan) {
        let targets = self.filter_targets(table);
        if targets.is_empty() {
            return;
        }
        for n in (1..=3).rev() {
            let mut start = 0;
            while start + n <= scan.tokens.len() {
                let span_free = (start..start + n).all(|i| scan.is_free(i));
                if !span_free || !scan.is_content(start) || !scan.is_content(start + n - 1) {
                    start += 1;
                    continue;
                }
                let phrase = scan.tokens[start..start + n]
                    .iter()
                    .map(|t| t.lower.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let hit = targets.iter().find_map(|(column, join)| {
                    column
                        .sample_values
                        .iter()
                        .find(|v| v.to_lowercase() == phrase)
                        .map(|v| (*column, join, v))
                });
                match hit {
                    Some((column, join, value)) => {
                        if let Some(join) = join {
                            push_join(&mut plan.joins, join.clone());
                        }
                        plan.filters.push(Predicate {
                            column: column_ref(column),
                            op: Operator::Eq,
                            value: SqlValue::Text(value.clone()),
                        });
                        scan.claim(start, n);
                        start += n;
                    }
                    None => start += 1,
                }
            }
        }
    }

    /// "department Sales": a categorical column mention followed by a
    /// capitalised word filters on that word.
    fn match_column_values(
        &self,
        scan: &mut Scan,
        table: &'a TableProfile,
        mentions: &[Mention<'a>],
        plan: &mut QueryPlan,
    ) {
        for mention in mentions {
            let next = mention.at + 1;
            let capitalised = scan.is_content(next)
                && scan.tokens[next]
                    .raw
                    .chars()
                    .next()
                    .is_some_and(char::is_uppercase)
                && !mentions.iter().any(|m| m.at == next);
            if !capitalised || !scan.is_free(mention.at) {
                continue;
            }
            let target = match mention.column.role {
                SemanticRole::Categorical | SemanticRole::Name => Some(mention.column),
                SemanticRole::Identifier => self.follow(table, mention.column, &mut plan.joins),
                _ => None,
            };
            if let Some(column) = target {
                plan.filters.push(Predicate {
                    column: column_ref(column),
                    op: Operator::Eq,
                    value: SqlValue::Text(scan.tokens[next].raw.clone()),
                });
                scan.claim(mention.at, 2);
            }
        }
    }

    /// Follow a foreign-key column to the related table's label column,
    /// recording the join.
    fn follow(
        &self,
        table: &TableProfile,
        column: &ColumnProfile,
        joins: &mut Vec<Join>,
    ) -> Option<&'a ColumnProfile> {
        let rel = self
            .schema
            .relationships_from(&table.name)
            .find(|r| r.from_column.eq_ignore_ascii_case(&column.name))?;
        let target = self.schema.table(&rel.to_table)?;
        let label = target.label_column()?;
        push_join(
            joins,
            Join {
                table: target.name.clone(),
                from: ColumnRef::new(&table.name, &rel.from_column),
                to: ColumnRef::new(&target.name, &rel.to_column),
            },
        );
        Some(label)
    }

    fn resolve_group(
        &self,
        text: &str,
        term: &Token,
        table: &'a TableProfile,
        joins: &mut Vec<Join>,
    ) -> Result<GroupBy> {
        if let Some(column) = best_column(term, table) {
            if column.role == SemanticRole::Identifier && !column.primary_key {
                if let Some(label) = self.follow(table, column, joins) {
                    return Ok(GroupBy {
                        column: column_ref(label),
                        label: singular(&term.lower),
                    });
                }
            }
            return Ok(GroupBy {
                column: column_ref(column),
                label: column.name.clone(),
            });
        }

        let related = self.schema.relationships_from(&table.name).find(|r| {
            self.schema
                .table(&r.to_table)
                .is_some_and(|t| table_match(term, t).is_some())
        });
        if let Some(rel) = related {
            let from = table.column(&rel.from_column);
            if let Some(label) = from.and_then(|c| self.follow(table, c, joins)) {
                return Ok(GroupBy {
                    column: column_ref(label),
                    label: singular(&term.lower),
                });
            }
        }
        Err(Error::unsupported(
            text,
            format!("cannot group '{}' by '{}'", table.name, term.raw),
        ))
    }

    /// The numeric column a query refers to: a mentioned measure, else the
    /// table's only measure. Leftover unmatched words make the fallback an
    /// error, since they likely name a column that does not exist.
    fn measure(
        &self,
        text: &str,
        table: &'a TableProfile,
        mentions: &[Mention<'a>],
        unresolved: &[&str],
        purpose: &str,
    ) -> Result<&'a ColumnProfile> {
        if let Some(m) = mentions
            .iter()
            .find(|m| m.column.role == SemanticRole::NumericMeasure)
        {
            return Ok(m.column);
        }
        if let Some(word) = unresolved.first() {
            return Err(Error::unsupported(
                text,
                format!("no column of '{}' matches '{}'", table.name, word),
            ));
        }
        let mut measures = table.columns_with_role(SemanticRole::NumericMeasure);
        match (measures.next(), measures.next()) {
            (Some(only), None) => Ok(only),
            (Some(_), Some(_)) => Err(Error::unsupported(
                text,
                format!("ambiguous numeric column to {} in '{}'", purpose, table.name),
            )),
            (None, _) => Err(Error::unsupported(
                text,
                format!("no numeric column to {} in '{}'", purpose, table.name),
            )),
        }
    }

    fn date_column(
        &self,
        text: &str,
        table: &'a TableProfile,
        mentions: &[Mention<'a>],
    ) -> Result<&'a ColumnProfile> {
        mentions
            .iter()
            .map(|m| m.column)
            .find(|c| c.role == SemanticRole::Date)
            .or_else(|| table.columns_with_role(SemanticRole::Date).next())
            .ok_or_else(|| {
                Error::unsupported(text, format!("no date column in '{}'", table.name))
            })
    }

    fn comparison(
        &self,
        text: &str,
        cmp: &Comparison,
        table: &'a TableProfile,
        mentions: &[Mention<'a>],
        unresolved: &[&str],
    ) -> Result<Predicate> {
        // The column named just before the comparison phrase, if any.
        let nearby = mentions
            .iter()
            .filter(|m| m.at < cmp.at && cmp.at - m.at <= 3)
            .max_by_key(|m| m.at)
            .map(|m| m.column);

        let temporal = cmp.temporal || nearby.is_some_and(|c| c.role == SemanticRole::Date);
        if temporal {
            let column = match nearby.filter(|c| c.role == SemanticRole::Date) {
                Some(c) => c,
                None => self.date_column(text, table, mentions)?,
            };
            let year = cmp
                .number
                .parse::<i32>()
                .map_err(|_| Error::unsupported(text, format!("'{}' is not a year", cmp.number)))?;
            let (op, value) = date_value(text, cmp.op, year)?;
            return Ok(Predicate {
                column: column_ref(column),
                op,
                value,
            });
        }

        let column = match nearby.filter(|c| c.role == SemanticRole::NumericMeasure) {
            Some(c) => c,
            None => self.measure(text, table, mentions, unresolved, "compare")?,
        };
        Ok(Predicate {
            column: column_ref(column),
            op: cmp.op,
            value: number_value(&cmp.number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Relationship, RelationshipOrigin};

    fn col(table: &str, name: &str, role: SemanticRole, samples: &[&str]) -> ColumnProfile {
        ColumnProfile {
            table: table.into(),
            name: name.into(),
            role,
            data_type: String::new(),
            nullable: name != "id",
            primary_key: name == "id",
            sample_values: samples.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `employees(id, name, department, salary, hire_date)`
    fn flat() -> SchemaGraph {
        use crate::models::SemanticRole::*;
        let t = "employees";
        SchemaGraph {
            tables: vec![TableProfile {
                name: t.into(),
                columns: vec![
                    col(t, "id", Identifier, &[]),
                    col(t, "name", Name, &[]),
                    col(t, "department", Categorical, &["Engineering", "Human Resources", "Sales"]),
                    col(t, "salary", NumericMeasure, &[]),
                    col(t, "hire_date", Date, &[]),
                ],
            }],
            relationships: vec![],
        }
    }

    /// `departments(id, name, budget)` and `employees(..., department_id)`.
    fn joined() -> SchemaGraph {
        use crate::models::SemanticRole::*;
        SchemaGraph {
            tables: vec![
                TableProfile {
                    name: "departments".into(),
                    columns: vec![
                        col("departments", "id", Identifier, &[]),
                        col("departments", "name", Name, &["Engineering", "Sales"]),
                        col("departments", "budget", NumericMeasure, &[]),
                    ],
                },
                TableProfile {
                    name: "employees".into(),
                    columns: vec![
                        col("employees", "id", Identifier, &[]),
                        col("employees", "name", Name, &[]),
                        col("employees", "department_id", Identifier, &[]),
                        col("employees", "salary", NumericMeasure, &[]),
                        col("employees", "hire_date", Date, &[]),
                    ],
                },
            ],
            relationships: vec![Relationship {
                from_table: "employees".into(),
                from_column: "department_id".into(),
                to_table: "departments".into(),
                to_column: "id".into(),
                origin: RelationshipOrigin::Inferred,
            }],
        }
    }

    fn run(schema: &SchemaGraph, text: &str) -> Result<QueryPlan> {
        let options = TranslateOptions {
            default_limit: 1000,
            top_n: 5,
            current_year: 2024,
        };
        Translator::new(schema, options).translate(text)
    }

    fn order_column(plan: &QueryPlan) -> (String, SortDirection) {
        match &plan.order_by {
            Some(OrderBy {
                target: OrderTarget::Column(c),
                direction,
            }) => (c.column.clone(), *direction),
            other => panic!("unexpected order {:?}", other),
        }
    }

    #[test]
    fn average_salary_by_department() {
        let plan = run(&flat(), "average salary by department").unwrap();
        assert_eq!(plan.kind, PlanKind::Aggregate);
        assert_eq!(plan.table, "employees");
        let agg = plan.aggregate.as_ref().unwrap();
        assert_eq!(agg.func, AggregateFn::Avg);
        assert_eq!(agg.column, Some(ColumnRef::new("employees", "salary")));
        let group = plan.group_by.as_ref().unwrap();
        assert_eq!(group.column, ColumnRef::new("employees", "department"));
        assert_eq!(group.label, "department");
        assert_eq!(order_column(&plan), ("department".into(), Asc));
        assert!(plan.filters.is_empty());
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn most_recent_hires_order_by_hire_date() {
        let plan = run(&flat(), "show the most recent hires").unwrap();
        assert_eq!(plan.kind, PlanKind::List);
        assert_eq!(plan.table, "employees");
        assert_eq!(order_column(&plan), ("hire_date".into(), Desc));
        assert_eq!(plan.limit, Some(1000));
    }

    #[test]
    fn how_many_employees_counts_rows() {
        let plan = run(&flat(), "How many employees are there?").unwrap();
        assert_eq!(plan.kind, PlanKind::Count);
        assert_eq!(
            plan.aggregate,
            Some(Aggregate {
                func: AggregateFn::Count,
                column: None
            })
        );
        assert_eq!(plan.order_by, None);
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn plain_list_defaults_to_identifier_order() {
        let plan = run(&flat(), "list employees").unwrap();
        assert_eq!(plan.kind, PlanKind::List);
        assert_eq!(order_column(&plan), ("id".into(), Asc));
        assert_eq!(plan.limit, Some(1000));
    }

    #[test]
    fn qualifier_values_become_bound_filters() {
        let plan = run(&flat(), "how many employees in Engineering").unwrap();
        assert_eq!(
            plan.filters,
            vec![Predicate {
                column: ColumnRef::new("employees", "department"),
                op: Operator::Eq,
                value: SqlValue::Text("Engineering".into()),
            }]
        );

        let plan = run(&flat(), "employees in human resources").unwrap();
        assert_eq!(plan.filters[0].value, SqlValue::Text("Human Resources".into()));
    }

    #[test]
    fn column_name_followed_by_value_filters() {
        let plan = run(&flat(), "employees in department Marketing").unwrap();
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.filters[0].column.column, "department");
        assert_eq!(plan.filters[0].value, SqlValue::Text("Marketing".into()));
    }

    #[test]
    fn top_n_uses_explicit_count_and_synonyms() {
        let plan = run(&flat(), "top 3 highest paid employees").unwrap();
        assert_eq!(plan.kind, PlanKind::TopN);
        assert_eq!(order_column(&plan), ("salary".into(), Desc));
        assert_eq!(plan.limit, Some(3));

        let plan = run(&flat(), "lowest paid staff").unwrap();
        assert_eq!(order_column(&plan), ("salary".into(), Asc));
        assert_eq!(plan.limit, Some(5));
    }

    #[test]
    fn numeric_comparisons() {
        let plan = run(&flat(), "employees with salary over 100,000").unwrap();
        assert_eq!(
            plan.filters,
            vec![Predicate {
                column: ColumnRef::new("employees", "salary"),
                op: Operator::Gt,
                value: SqlValue::Integer(100000),
            }]
        );
        let plan = run(&flat(), "employees earning at least 55000.50").unwrap();
        assert_eq!(plan.filters[0].op, Operator::Gte);
        assert_eq!(plan.filters[0].value, SqlValue::Real(55000.5));
    }

    #[test]
    fn temporal_qualifiers() {
        let plan = run(&flat(), "employees hired after 2020").unwrap();
        assert_eq!(plan.filters[0].column.column, "hire_date");
        assert_eq!(plan.filters[0].op, Operator::Gte);
        assert_eq!(plan.filters[0].value, SqlValue::Text("2021-01-01".into()));

        let plan = run(&flat(), "employees hired before 2019").unwrap();
        assert_eq!(plan.filters[0].op, Operator::Lt);
        assert_eq!(plan.filters[0].value, SqlValue::Text("2019-01-01".into()));

        let plan = run(&flat(), "how many employees were hired in 2021").unwrap();
        assert_eq!(plan.filters[0].op, Operator::YearEq);
        assert_eq!(plan.filters[0].value, SqlValue::Text("2021".into()));

        let plan = run(&flat(), "employees hired last year").unwrap();
        assert_eq!(plan.filters[0].value, SqlValue::Text("2023".into()));
        let plan = run(&flat(), "employees hired this year").unwrap();
        assert_eq!(plan.filters[0].value, SqlValue::Text("2024".into()));
    }

    #[test]
    fn named_filters_on_name_column() {
        let plan = run(&flat(), "salary of the employee named Ada Lovelace").unwrap();
        assert_eq!(plan.filters[0].column.column, "name");
        assert_eq!(plan.filters[0].value, SqlValue::Text("Ada Lovelace".into()));
    }

    #[test]
    fn grouping_without_aggregate_counts() {
        let plan = run(&flat(), "employees per department").unwrap();
        assert_eq!(plan.kind, PlanKind::Count);
        assert_eq!(plan.group_by.unwrap().column.column, "department");
    }

    #[test]
    fn grouping_through_relationship_joins() {
        let plan = run(&joined(), "average salary by department").unwrap();
        assert_eq!(plan.table, "employees");
        assert_eq!(
            plan.joins,
            vec![Join {
                table: "departments".into(),
                from: ColumnRef::new("employees", "department_id"),
                to: ColumnRef::new("departments", "id"),
            }]
        );
        let group = plan.group_by.unwrap();
        assert_eq!(group.column, ColumnRef::new("departments", "name"));
        assert_eq!(group.label, "department");
    }

    #[test]
    fn filtering_through_relationship_joins() {
        let plan = run(&joined(), "employees in Engineering").unwrap();
        assert_eq!(plan.table, "employees");
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.filters[0].column, ColumnRef::new("departments", "name"));
    }

    #[test]
    fn entity_ties_prefer_closest_table_name() {
        let plan = run(&joined(), "how many departments").unwrap();
        assert_eq!(plan.table, "departments");
        let plan = run(&joined(), "salary of employees in department Sales").unwrap();
        assert_eq!(plan.table, "employees");
        let plan = run(&joined(), "how many staff per dept").unwrap();
        assert_eq!(plan.table, "employees");
    }

    #[test]
    fn group_ranking_orders_by_aggregate() {
        let plan = run(&flat(), "average salary per department, top 2").unwrap();
        assert_eq!(plan.table, "employees");
        assert_eq!(plan.kind, PlanKind::Aggregate);
        assert_eq!(
            plan.order_by,
            Some(OrderBy {
                target: OrderTarget::Aggregate,
                direction: Desc
            })
        );
        assert_eq!(plan.limit, Some(2));
    }

    #[test]
    fn explicit_ordering() {
        let plan = run(&flat(), "list employees sorted by salary desc").unwrap();
        assert_eq!(order_column(&plan), ("salary".into(), Desc));
    }

    #[test]
    fn unknown_entities_and_columns_are_unsupported() {
        let err = run(&joined(), "list widgets").unwrap_err();
        assert!(matches!(err, Error::UnsupportedQuery { .. }));
        assert!(err.to_string().contains("widgets"), "{err}");

        let err = run(&flat(), "average bonus of employees").unwrap_err();
        assert!(err.to_string().contains("bonus"), "{err}");

        let err = run(&flat(), "employees grouped by planet").unwrap_err();
        assert!(err.to_string().contains("planet"), "{err}");
    }

    #[test]
    fn unmatched_qualifiers_are_unsupported() {
        for (query, word) in [
            ("how many employees in Marketing", "Marketing"),
            ("list the bonus of employees", "bonus"),
            ("average salary of employees in Marketing", "Marketing"),
            ("employees with Rust", "Rust"),
        ] {
            let err = run(&flat(), query).unwrap_err();
            assert!(matches!(err, Error::UnsupportedQuery { .. }), "{query}");
            assert!(err.to_string().contains(word), "{err}");
        }
    }

    #[test]
    fn unmatched_filler_words_are_ignored() {
        let plan = run(&flat(), "How many employees are there?").unwrap();
        assert_eq!(plan.kind, PlanKind::Count);
        let plan = run(&flat(), "resumes mentioning kubernetes and the average salary").unwrap();
        assert_eq!(plan.kind, PlanKind::Aggregate);
    }

    #[test]
    fn number_like_words_are_names() {
        let plan = run(&flat(), "employees named Nan").unwrap();
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.filters[0].column.column, "name");
        assert_eq!(plan.filters[0].value, SqlValue::Text("Nan".into()));
    }

    #[test]
    fn every_cue_rule_fires_on_its_own() {
        for &(phrase, cue) in CUE_RULES {
            let mut scan = Scan::new(&format!("{phrase} employees"));
            let intent = scan.read_intent(2024);
            let seen = match cue {
                Cue::Aggregate(f) => intent.aggregate == Some(f),
                Cue::Rank(d) => intent.rank == Some(d),
                Cue::Recency(d) => intent.recency == Some(d),
            };
            assert!(seen, "{phrase}");
        }
    }

    #[test]
    fn every_comparison_rule_fires_on_its_own() {
        for &(phrase, op, temporal) in COMPARISON_RULES {
            let mut scan = Scan::new(&format!("salary {phrase} 2000"));
            let intent = scan.read_intent(2024);
            assert_eq!(intent.comparisons.len(), 1, "{phrase}");
            assert_eq!(intent.comparisons[0].op, op, "{phrase}");
            assert_eq!(intent.comparisons[0].temporal, temporal, "{phrase}");
        }
    }

    #[test]
    fn every_group_phrase_fires_on_its_own() {
        for phrase in GROUP_PHRASES {
            let mut scan = Scan::new(&format!("salary {phrase} department"));
            let intent = scan.read_intent(2024);
            let term = intent.group.map(|i| scan.tokens[i].lower.clone());
            assert_eq!(term.as_deref(), Some("department"), "{phrase}");
        }
    }

    #[test]
    fn translation_is_deterministic() {
        let schema = joined();
        let a = run(&schema, "top 3 employees by salary hired after 2019").unwrap();
        let b = run(&schema, "top 3 employees by salary hired after 2019").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.kind, PlanKind::TopN);
        assert_eq!(a.group_by, None);
        assert_eq!(order_column(&a), ("salary".into(), Desc));
        assert_eq!(a.limit, Some(3));
        assert_eq!(a.filters[0].value, SqlValue::Text("2020-01-01".into()));
    }
}
