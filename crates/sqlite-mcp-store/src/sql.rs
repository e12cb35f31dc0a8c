// sqlite-mcp-store/src/sql.rs
// ============================================================================
// Module: SQL Lexing
// Description: Lightweight SQL tokenizer for classification and binding checks.
// Purpose: Inspect caller SQL before it reaches the driver.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! This is not a parser. It tokenizes just enough SQL to:
//! - classify a statement as read-only or mutating;
//! - count placeholders so binding arity is checked locally;
//! - reject statements that would escape the path policy (`ATTACH`,
//!   `VACUUM INTO`, `load_extension`) or mutate pooled connection state
//!   (`PRAGMA` assignments).
//!
//! String literals, quoted identifiers, and comments are skipped so that
//! placeholder-looking text inside them is ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::error::DbError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Highest parameter index SQLite accepts by default.
pub const MAX_PARAMETER_INDEX: usize = 32_766;

/// Pragmas whose parenthesized form is a read.
const READ_PRAGMAS: &[&str] = &[
    "TABLE_INFO",
    "TABLE_XINFO",
    "TABLE_LIST",
    "INDEX_LIST",
    "INDEX_INFO",
    "INDEX_XINFO",
    "FOREIGN_KEY_LIST",
    "FOREIGN_KEY_CHECK",
    "INTEGRITY_CHECK",
    "QUICK_CHECK",
];

/// Pragmas whose bare form only reports a value.
///
/// Any other bare pragma, such as `incremental_vacuum`, `optimize`, or
/// `wal_checkpoint`, may write to the file and needs the writer slot.
const BARE_READ_PRAGMAS: &[&str] = &[
    "APPLICATION_ID",
    "AUTO_VACUUM",
    "BUSY_TIMEOUT",
    "CACHE_SIZE",
    "CACHE_SPILL",
    "CELL_SIZE_CHECK",
    "CHECKPOINT_FULLFSYNC",
    "COLLATION_LIST",
    "COMPILE_OPTIONS",
    "DATABASE_LIST",
    "DATA_VERSION",
    "DEFER_FOREIGN_KEYS",
    "ENCODING",
    "FOREIGN_KEY_CHECK",
    "FOREIGN_KEYS",
    "FREELIST_COUNT",
    "FULLFSYNC",
    "FUNCTION_LIST",
    "HARD_HEAP_LIMIT",
    "IGNORE_CHECK_CONSTRAINTS",
    "INTEGRITY_CHECK",
    "JOURNAL_MODE",
    "JOURNAL_SIZE_LIMIT",
    "LOCKING_MODE",
    "MAX_PAGE_COUNT",
    "MMAP_SIZE",
    "MODULE_LIST",
    "PAGE_COUNT",
    "PAGE_SIZE",
    "PRAGMA_LIST",
    "QUERY_ONLY",
    "QUICK_CHECK",
    "READ_UNCOMMITTED",
    "RECURSIVE_TRIGGERS",
    "REVERSE_UNORDERED_SELECTS",
    "SCHEMA_VERSION",
    "SECURE_DELETE",
    "SOFT_HEAP_LIMIT",
    "SYNCHRONOUS",
    "TABLE_LIST",
    "TEMP_STORE",
    "THREADS",
    "TRUSTED_SCHEMA",
    "USER_VERSION",
    "WAL_AUTOCHECKPOINT",
];

/// Keywords that make a `WITH` statement mutating.
const MUTATING_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE"];

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Bare keyword or identifier, uppercased.
    Word(String),
    /// Parameter placeholder.
    Param(Placeholder),
    /// Single punctuation character.
    Punct(char),
    /// String literal, quoted identifier, or number.
    Literal,
}

/// Placeholder syntax recognized by SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placeholder {
    /// `?`
    Anonymous,
    /// `?NNN`
    Numbered(usize),
    /// `:name`, `@name`, `$name` (sigil included).
    Named(String),
}

/// Splits SQL into tokens, skipping whitespace and comments.
fn tokenize(sql: &str) -> Result<Vec<Token>, DbError> {
    let chars: Vec<char> = sql.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < len {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < len && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(len);
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                i = skip_quoted(&chars, i, c);
                tokens.push(Token::Literal);
            }
            '[' => {
                while i < len && chars[i] != ']' {
                    i += 1;
                }
                i = (i + 1).min(len);
                tokens.push(Token::Literal);
            }
            '?' => {
                i += 1;
                let start = i;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if start == i {
                    tokens.push(Token::Param(Placeholder::Anonymous));
                } else {
                    let digits: String = chars[start .. i].iter().collect();
                    let index = digits
                        .parse::<usize>()
                        .ok()
                        .filter(|index| (1 ..= MAX_PARAMETER_INDEX).contains(index))
                        .ok_or_else(|| {
                            DbError::InvalidParameters(format!("invalid placeholder ?{digits}"))
                        })?;
                    tokens.push(Token::Param(Placeholder::Numbered(index)));
                }
            }
            ':' | '@' | '$' => {
                let start = i;
                i += 1;
                while i < len && is_ident_char(chars[i]) {
                    i += 1;
                }
                if i == start + 1 {
                    tokens.push(Token::Punct(c));
                } else {
                    let name: String = chars[start .. i].iter().collect();
                    tokens.push(Token::Param(Placeholder::Named(name)));
                }
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < len && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start .. i].iter().collect();
                tokens.push(Token::Word(word.to_ascii_uppercase()));
            }
            c if c.is_ascii_digit() || c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit) => {
                while i < len && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Literal);
            }
            other => {
                tokens.push(Token::Punct(other));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

/// Advances past a quoted run, honoring doubled quote escapes.
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Returns true for characters that may start a bare identifier.
fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Returns true for characters that may continue a bare identifier.
fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Read/write classification of a single statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Statement only reads.
    Read,
    /// Statement may modify the database or its schema.
    Mutating,
}

impl StatementKind {
    /// Classifies a statement by its leading keyword.
    ///
    /// Unknown statement shapes are treated as mutating.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] when the SQL is empty or only
    /// contains comments.
    pub fn classify(sql: &str) -> Result<Self, DbError> {
        let tokens = tokenize(sql)?;
        Ok(classify_tokens(&tokens)?.0)
    }

    /// Returns true when the statement only reads.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }
}

/// Classifies tokens, also reporting whether a pragma writes.
fn classify_tokens(tokens: &[Token]) -> Result<(StatementKind, bool), DbError> {
    let Some(first) = tokens.iter().find(|token| !matches!(token, Token::Punct('(' | ';'))) else {
        return Err(DbError::InvalidParameters("SQL statement is empty".to_string()));
    };
    let Token::Word(first) = first else {
        return Ok((StatementKind::Mutating, false));
    };
    let kind = match first.as_str() {
        "SELECT" | "VALUES" | "EXPLAIN" => StatementKind::Read,
        "WITH" => {
            let mutating = tokens.iter().any(|token| {
                matches!(token, Token::Word(word) if MUTATING_KEYWORDS.contains(&word.as_str()))
            });
            if mutating { StatementKind::Mutating } else { StatementKind::Read }
        }
        "PRAGMA" => match pragma_access(tokens) {
            PragmaAccess::Read => StatementKind::Read,
            PragmaAccess::Maintenance => StatementKind::Mutating,
            PragmaAccess::Assignment => return Ok((StatementKind::Mutating, true)),
        },
        _ => StatementKind::Mutating,
    };
    Ok((kind, false))
}

/// How a `PRAGMA` statement touches the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PragmaAccess {
    /// Reports a value without changing anything.
    Read,
    /// Bare pragma that may write to the file, such as `incremental_vacuum`.
    Maintenance,
    /// Sets a value with `=` or a non-read argument.
    Assignment,
}

/// Classifies a `PRAGMA` statement against the read allowlists.
fn pragma_access(tokens: &[Token]) -> PragmaAccess {
    if tokens.iter().any(|token| token == &Token::Punct('=')) {
        return PragmaAccess::Assignment;
    }
    let mut name: Option<&str> = None;
    for token in tokens.iter().skip(1) {
        match token {
            Token::Word(word) => name = Some(word.as_str()),
            Token::Punct('.') => {}
            Token::Punct('(') => {
                return if name.is_some_and(|name| READ_PRAGMAS.contains(&name)) {
                    PragmaAccess::Read
                } else {
                    PragmaAccess::Assignment
                };
            }
            _ => break,
        }
    }
    if name.is_some_and(|name| BARE_READ_PRAGMAS.contains(&name)) {
        PragmaAccess::Read
    } else {
        PragmaAccess::Maintenance
    }
}

// ============================================================================
// SECTION: Statement Guard
// ============================================================================

/// Rejects statements that escape the path policy or alter pooled connections.
///
/// # Errors
///
/// Returns [`DbError::PermissionDenied`] for `ATTACH`, `DETACH`,
/// `VACUUM INTO`, `load_extension(...)`, and pragma assignments, and
/// [`DbError::InvalidParameters`] for transaction control statements.
pub fn check_statement_guard(sql: &str) -> Result<(), DbError> {
    let tokens = tokenize(sql)?;
    let (_, pragma_write) = classify_tokens(&tokens)?;
    if pragma_write {
        return Err(DbError::PermissionDenied(
            "PRAGMA assignments are not permitted through the query tool".to_string(),
        ));
    }
    let first = tokens.iter().find_map(|token| match token {
        Token::Word(word) => Some(word.as_str()),
        _ => None,
    });
    if matches!(first, Some("ATTACH" | "DETACH")) {
        return Err(DbError::PermissionDenied(
            "attaching or detaching databases is not permitted".to_string(),
        ));
    }
    if matches!(first, Some("BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE")) {
        return Err(DbError::InvalidParameters(
            "transaction control statements cannot span tool calls".to_string(),
        ));
    }
    for pair in tokens.windows(2) {
        match (&pair[0], &pair[1]) {
            (Token::Word(word), Token::Punct('(')) if word == "LOAD_EXTENSION" => {
                return Err(DbError::PermissionDenied(
                    "loading extensions is not permitted".to_string(),
                ));
            }
            (Token::Word(word), Token::Word(next)) if word == "VACUUM" && next == "INTO" => {
                return Err(DbError::PermissionDenied("VACUUM INTO is not permitted".to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Placeholders
// ============================================================================

/// Placeholder layout of a statement, computed the way SQLite numbers them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderSet {
    /// Number of parameter slots (highest index in use).
    pub count: usize,
    /// Distinct named placeholders with their sigil, in first-use order.
    pub names: Vec<String>,
    /// True when any `?` or `?NNN` placeholder is present.
    pub has_unnamed: bool,
}

impl PlaceholderSet {
    /// Scans SQL for placeholders, ignoring literals and comments.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] for out-of-range `?NNN`
    /// placeholders.
    pub fn scan(sql: &str) -> Result<Self, DbError> {
        let mut set = Self::default();
        let mut named: BTreeMap<String, usize> = BTreeMap::new();
        for token in tokenize(sql)? {
            let Token::Param(placeholder) = token else {
                continue;
            };
            match placeholder {
                Placeholder::Anonymous => {
                    set.count += 1;
                    set.has_unnamed = true;
                }
                Placeholder::Numbered(index) => {
                    set.count = set.count.max(index);
                    set.has_unnamed = true;
                }
                Placeholder::Named(name) => {
                    if !named.contains_key(&name) {
                        set.count += 1;
                        named.insert(name.clone(), set.count);
                        set.names.push(name);
                    }
                }
            }
        }
        if set.count > MAX_PARAMETER_INDEX {
            return Err(DbError::InvalidParameters("too many SQL parameters".to_string()));
        }
        Ok(set)
    }

    /// Checks that a positional parameter list fills every slot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] on arity mismatch.
    pub fn check_positional(&self, supplied: usize) -> Result<(), DbError> {
        if supplied == self.count {
            return Ok(());
        }
        Err(DbError::InvalidParameters(format!(
            "statement has {} placeholder(s) but {supplied} parameter(s) were supplied",
            self.count
        )))
    }

    /// Checks that a named parameter map matches the named placeholders.
    ///
    /// Keys may be given with or without their sigil.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidParameters`] when unnamed placeholders are
    /// present, a placeholder has no value, or a key matches no placeholder.
    pub fn check_named<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), DbError> {
        if self.has_unnamed {
            return Err(DbError::InvalidParameters(
                "named parameters cannot bind '?' placeholders".to_string(),
            ));
        }
        let mut expected: BTreeMap<&str, bool> =
            self.names.iter().map(|name| (strip_sigil(name), false)).collect();
        for key in keys {
            let bare = strip_sigil(key);
            match expected.get_mut(bare) {
                Some(seen) => *seen = true,
                None => {
                    return Err(DbError::InvalidParameters(format!(
                        "no placeholder named {bare} in statement"
                    )));
                }
            }
        }
        if let Some((missing, _)) = expected.iter().find(|(_, seen)| !**seen) {
            return Err(DbError::InvalidParameters(format!("missing value for parameter {missing}")));
        }
        Ok(())
    }
}

/// Removes a leading `:`, `@`, or `$` sigil.
#[must_use]
pub fn strip_sigil(name: &str) -> &str {
    name.strip_prefix([':', '@', '$']).unwrap_or(name)
}

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Double-quotes an identifier that has already been validated against the
/// live schema.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
