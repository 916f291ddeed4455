use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
pub use string_cache::DefaultAtom as Atom;

/// Opaque stimulus value (a shape name, a digit).
///
/// Interned so equality checks in the scoring path are pointer compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(Atom);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(Atom::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(Atom::from(s))
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0.to_string()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of symbols a run draws its stimuli from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Symbol>", into = "Vec<Symbol>")]
pub struct Alphabet {
    symbols: Vec<Symbol>,
}

impl Alphabet {
    pub fn new<I, S>(symbols: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut out: Vec<Symbol> = Vec::new();
        for s in symbols {
            let s = s.into();
            if out.contains(&s) {
                return Err(CoreError::DuplicateSymbol(s.to_string()));
            }
            out.push(s);
        }
        if out.len() < 2 {
            return Err(CoreError::AlphabetTooSmall(out.len()));
        }
        Ok(Self { symbols: out })
    }

    /// circle, star, triangle
    pub fn shapes() -> Self {
        Self::from_static(&["circle", "star", "triangle"])
    }

    /// circle, star, triangle, square
    pub fn shapes_with_square() -> Self {
        Self::from_static(&["circle", "star", "triangle", "square"])
    }

    /// 1, 2, 3
    pub fn numbers() -> Self {
        Self::from_static(&["1", "2", "3"])
    }

    /// 1, 2, 3, 4
    pub fn numbers_with_four() -> Self {
        Self::from_static(&["1", "2", "3", "4"])
    }

    /// "1" through `n`.
    pub fn digits(n: u8) -> Result<Self, CoreError> {
        Self::new((1..=n).map(|d| d.to_string()))
    }

    fn from_static(names: &[&str]) -> Self {
        Self {
            symbols: names.iter().map(|n| Symbol::new(n)).collect(),
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn index_of(&self, symbol: &Symbol) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Every member except `excluded`, in alphabet order.
    pub fn without(&self, excluded: &Symbol) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter(|s| *s != excluded)
            .cloned()
            .collect()
    }
}

impl TryFrom<Vec<Symbol>> for Alphabet {
    type Error = CoreError;

    fn try_from(symbols: Vec<Symbol>) -> Result<Self, Self::Error> {
        Self::new(symbols)
    }
}

impl From<Alphabet> for Vec<Symbol> {
    fn from(a: Alphabet) -> Self {
        a.symbols
    }
}
