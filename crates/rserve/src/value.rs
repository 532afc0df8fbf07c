use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// R's integer NA.
pub const NA_INTEGER: i32 = i32::MIN;

/// A value returned by R, decoded from a QAP1 SEXP.
///
/// This is deliberately loose: callers that expect a particular shape go
/// through the `Serialize` impl into their own typed structs rather than
/// matching on variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    Null,
    /// Integer vector; `None` is `NA`.
    Ints(Vec<Option<i32>>),
    /// Double vector; `NA` and `NaN` are kept as NaN.
    Doubles(Vec<f64>),
    Strings(Vec<Option<String>>),
    Logicals(Vec<Option<bool>>),
    Raw(Vec<u8>),
    Symbol(String),
    /// Generic vector or pairlist. `names` is set when the list carried a
    /// `names` attribute or tags.
    List {
        values: Vec<RValue>,
        names: Option<Vec<String>>,
    },
    /// A SEXP type we do not decode (closures, S4 objects, complex, ...).
    Unsupported(u8),
}

impl RValue {
    /// Named list from `(name, value)` pairs.
    pub fn named<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, RValue)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<RValue>) = entries
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();
        Self::List {
            values,
            names: Some(names),
        }
    }

    pub fn ints(values: impl IntoIterator<Item = i32>) -> Self {
        Self::Ints(values.into_iter().map(Some).collect())
    }

    pub fn doubles(values: impl IntoIterator<Item = f64>) -> Self {
        Self::Doubles(values.into_iter().collect())
    }

    /// Look up a list element by name.
    pub fn get(&self, name: &str) -> Option<&RValue> {
        match self {
            Self::List {
                values,
                names: Some(names),
            } => names
                .iter()
                .position(|n| n == name)
                .and_then(|i| values.get(i)),
            _ => None,
        }
    }

    /// Number of elements (1 for symbols, 0 for null).
    pub fn len(&self) -> usize {
        match self {
            Self::Null | Self::Unsupported(_) => 0,
            Self::Ints(v) => v.len(),
            Self::Doubles(v) => v.len(),
            Self::Strings(v) => v.len(),
            Self::Logicals(v) => v.len(),
            Self::Raw(v) => v.len(),
            Self::Symbol(_) => 1,
            Self::List { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Ints(_) => "integer",
            Self::Doubles(_) => "double",
            Self::Strings(_) => "character",
            Self::Logicals(_) => "logical",
            Self::Raw(_) => "raw",
            Self::Symbol(_) => "symbol",
            Self::List { .. } => "list",
            Self::Unsupported(_) => "unsupported",
        }
    }

    /// Whether every element has a distinct, non-empty name.
    fn has_usable_names(values: &[RValue], names: &Option<Vec<String>>) -> bool {
        match names {
            Some(names) if names.len() == values.len() => {
                let mut seen = std::collections::HashSet::new();
                names.iter().all(|n| !n.is_empty() && seen.insert(n.as_str()))
            }
            _ => false,
        }
    }
}

/// Neutral intermediate form: named lists become maps, every vector becomes a
/// sequence (length-1 vectors included), NA and non-finite doubles become
/// null.
impl Serialize for RValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Unsupported(_) => serializer.serialize_unit(),
            Self::Ints(v) => serializer.collect_seq(v),
            Self::Doubles(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for d in v {
                    if d.is_finite() {
                        seq.serialize_element(d)?;
                    } else {
                        seq.serialize_element(&Option::<f64>::None)?;
                    }
                }
                seq.end()
            }
            Self::Strings(v) => serializer.collect_seq(v),
            Self::Logicals(v) => serializer.collect_seq(v),
            Self::Raw(v) => serializer.collect_seq(v),
            Self::Symbol(s) => serializer.serialize_str(s),
            Self::List { values, names } => {
                if Self::has_usable_names(values, names) {
                    let names = names.as_deref().unwrap_or_default();
                    let mut map = serializer.serialize_map(Some(values.len()))?;
                    for (name, value) in names.iter().zip(values) {
                        map.serialize_entry(name, value)?;
                    }
                    map.end()
                } else {
                    serializer.collect_seq(values)
                }
            }
        }
    }
}
