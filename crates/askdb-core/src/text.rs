//! Tokenization and fuzzy-matching helpers shared by the classifier,
//! translator, and TF-IDF index.

/// Common English stopwords dropped from document search terms.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with", "this",
    "but", "they", "have", "had", "what", "when", "where", "who", "which", "why", "how", "me",
    "my", "all", "any", "do", "does", "there", "their", "them", "can", "you", "our", "we",
];

/// A word from a query, lowercased for matching with the original spelling
/// kept for values that flow into bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub lower: String,
    pub raw: String,
}

impl Token {
    /// Decimal numerals only; "nan" and "inf" are words.
    pub fn is_number(&self) -> bool {
        self.lower.bytes().any(|b| b.is_ascii_digit()) && self.lower.parse::<f64>().is_ok()
    }
}

/// Split `text` into word tokens.
///
/// Words are runs of alphanumerics and `_`. A `.` or `,` between two digits
/// stays inside the token, and thousands separators are dropped, so
/// `100,000` yields `100000` and `4.5` stays intact.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
            continue;
        }
        let between_digits = (c == '.' || c == ',')
            && current.chars().last().is_some_and(|p| p.is_ascii_digit())
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if between_digits {
            if c == '.' {
                current.push(c);
            }
            continue;
        }
        if !current.is_empty() {
            tokens.push(make_token(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        tokens.push(make_token(current));
    }
    tokens
}

fn make_token(raw: String) -> Token {
    Token {
        lower: raw.to_lowercase(),
        raw,
    }
}

/// Lowercased words of `text`, for index terms.
pub fn words(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|t| t.lower).collect()
}

pub fn is_stopword(word: &str) -> bool {
    ENGLISH_STOPWORDS.contains(&word)
}

/// Cheap English singular form: `employees` → `employee`,
/// `salaries` → `salary`, `hires` → `hire`, `status` stays.
pub fn singular(word: &str) -> String {
    let w = word.to_lowercase();
    if w.len() > 4 && w.ends_with("ies") {
        format!("{}y", &w[..w.len() - 3])
    } else if w.len() > 4 && (w.ends_with("sses") || w.ends_with("xes") || w.ends_with("ches")) {
        w[..w.len() - 2].to_string()
    } else if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") {
        w[..w.len() - 1].to_string()
    } else {
        w
    }
}

/// Split an identifier into lowercase parts: `hire_date` → `[hire, date]`,
/// `HireDate` → `[hire, date]`.
pub fn identifier_parts(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in ident.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Levenshtein edit distance between `a` and `b`.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();
    if n == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];
    for (i, c) in a.chars().enumerate() {
        curr[0] = i + 1;
        for j in 1..=n {
            let cost = if c == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Lowercase and collapse runs of whitespace. Used for cache keys.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Does `phrase` (space separated, lowercase) occur in `tokens` as a
/// contiguous run? Returns the index of the first token of the match.
pub fn find_phrase(tokens: &[Token], phrase: &str) -> Option<usize> {
    let parts: Vec<&str> = phrase.split(' ').collect();
    if parts.is_empty() || parts.len() > tokens.len() {
        return None;
    }
    (0..=tokens.len() - parts.len()).find(|&start| {
        parts
            .iter()
            .enumerate()
            .all(|(k, p)| word_matches(&tokens[start + k].lower, p))
    })
}

/// Exact or singular-form equality.
pub fn word_matches(word: &str, target: &str) -> bool {
    word == target || singular(word) == singular(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keeps_case_and_numbers() {
        let tokens = tokenize("Employees in Engineering earning over 100,000.");
        let raw: Vec<&str> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(
            raw,
            vec!["Employees", "in", "Engineering", "earning", "over", "100000"]
        );
        assert_eq!(tokens[0].lower, "employees");
        assert!(tokens[5].is_number());
        for word in ["nan", "inf", "Infinity", "NaN"] {
            assert!(!tokenize(word)[0].is_number(), "{word}");
        }
        assert!(tokenize("4.5")[0].is_number());
    }

    #[test]
    fn tokenize_keeps_decimals() {
        let tokens = tokenize("rating above 4.5");
        assert_eq!(tokens[2].raw, "4.5");
    }

    #[test]
    fn singular_forms() {
        assert_eq!(singular("employees"), "employee");
        assert_eq!(singular("salaries"), "salary");
        assert_eq!(singular("hires"), "hire");
        assert_eq!(singular("status"), "status");
        assert_eq!(singular("address"), "address");
        assert_eq!(singular("id"), "id");
    }

    #[test]
    fn identifier_parts_split_snake_and_camel() {
        assert_eq!(identifier_parts("hire_date"), vec!["hire", "date"]);
        assert_eq!(identifier_parts("HireDate"), vec!["hire", "date"]);
        assert_eq!(identifier_parts("dept_id"), vec!["dept", "id"]);
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("employee", "employees"), 1);
        assert_eq!(edit_distance("staff", "staff"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn phrase_search_respects_word_boundaries() {
        let tokens = tokenize("How many employees are there");
        assert_eq!(find_phrase(&tokens, "how many"), Some(0));
        assert_eq!(find_phrase(&tokens, "many employee"), Some(1));
        assert_eq!(find_phrase(&tokens, "employees are there now"), None);
        let tokens = tokenize("discount codes");
        assert_eq!(find_phrase(&tokens, "count"), None);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_query("  How   MANY\temployees "), "how many employees");
    }
}
