//! Legal, distinct identifiers for generated code.
//!
//! User-facing names (variables, procedures) may contain spaces or clash with
//! keywords of the target language. The database maps each one to a safe
//! identifier once, and never hands the same identifier out twice.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Words a generated C/C++ identifier must never be
pub const C_RESERVED_WORDS: &[&str] = &[
    "auto", "const", "double", "float", "int", "short", "struct", "unsigned", "break", "continue",
    "else", "for", "long", "signed", "switch", "void", "case", "default", "enum", "goto",
    "register", "sizeof", "typedef", "volatile", "char", "do", "extern", "if", "return", "static",
    "union", "while", "asm", "dynamic_cast", "namespace", "reinterpret_cast", "try", "bool",
    "explicit", "new", "static_cast", "typeid", "catch", "false", "operator", "template",
    "typename", "class", "friend", "private", "this", "using", "const_cast", "inline", "public",
    "throw", "virtual", "delete", "mutable", "protected", "true", "wchar_t",
];

// Literal patterns; compiling them cannot fail.
static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("literal pattern"));
static TYPE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^_([^_]+)").expect("literal pattern"));

/// Namespaces a name can live in; the same user name may map differently
/// per namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameType {
    Variable,
    Procedure,
}

/// Replace every character that cannot appear in an identifier with `_`,
/// and keep the result from starting with a digit
pub fn safe_name(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }
    let safe = ILLEGAL_CHARS.replace_all(name, "_");
    if safe.starts_with(|c: char| c.is_ascii_digit()) {
        format!("my_{safe}")
    } else {
        safe.into_owned()
    }
}

/// C type encoded in a `_type_name` style name, `int` otherwise
pub fn declared_type(name: &str) -> &str {
    TYPE_PREFIX
        .captures(name)
        .and_then(|c| c.get(1))
        .map_or("int", |m| m.as_str())
}

#[derive(Debug, Clone)]
pub struct NameDb {
    reserved: HashSet<String>,
    /// (lowercased user name, namespace) to issued identifier
    issued: HashMap<(String, NameType), String>,
    /// Every identifier handed out so far
    taken: HashSet<String>,
}

impl NameDb {
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            reserved: reserved.into_iter().map(str::to_string).collect(),
            issued: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    /// Database guarding the C/C++ keyword list
    pub fn for_c() -> Self {
        Self::new(C_RESERVED_WORDS.iter().copied())
    }

    /// Forget every issued name; reserved words stay
    pub fn reset(&mut self) {
        self.issued.clear();
        self.taken.clear();
    }

    /// The identifier for a user name, issuing one on first sight.
    /// User names compare case-insensitively.
    pub fn get_name(&mut self, name: &str, kind: NameType) -> String {
        let key = (name.to_lowercase(), kind);
        if let Some(issued) = self.issued.get(&key) {
            return issued.clone();
        }
        let distinct = self.get_distinct_name(name, kind);
        self.issued.insert(key, distinct.clone());
        distinct
    }

    /// A fresh identifier based on `name` that collides with nothing issued
    /// or reserved. Numbering starts at 2.
    pub fn get_distinct_name(&mut self, name: &str, _kind: NameType) -> String {
        let base = safe_name(name);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&candidate) || self.reserved.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}{suffix}");
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

impl Default for NameDb {
    fn default() -> Self {
        Self::for_c()
    }
}
