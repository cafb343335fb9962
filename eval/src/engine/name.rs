//! Hierarchical dollar names.

use std::fmt::{self, Display};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::errors::{ErrorKind, EvalResult};
use crate::value::Value;

/// An externally-addressable variable name: an ordered sequence of
/// segments, displayed dotted (`a.b.c`). Names compare
/// component-wise, which also gives the engine's maps a stable
/// iteration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DollarName(Vec<SmolStr>);

impl DollarName {
    pub fn new(segments: Vec<SmolStr>) -> Self {
        DollarName(segments)
    }

    /// Convenience constructor used pervasively in tests.
    pub fn of(segments: &[&str]) -> Self {
        DollarName(segments.iter().map(|s| SmolStr::from(*s)).collect())
    }

    /// Convert a runtime value (a list of strings) into a name.
    pub fn from_value(value: &Value) -> EvalResult<Self> {
        let items = value.as_list()?;
        let mut segments = Vec::with_capacity(items.len());
        for item in items.iter() {
            match item {
                Value::String(s) => segments.push(SmolStr::from(&**s)),
                other => {
                    return Err(ErrorKind::TypeError(format!(
                        "Dollar name segments must be strings, not '{}'",
                        other.type_name()
                    ))
                    .into())
                }
            }
        }
        Ok(DollarName(segments))
    }

    pub fn segments(&self) -> &[SmolStr] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &DollarName) -> bool {
        self.0.len() <= other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// The name extended by one child segment.
    pub fn child(&self, segment: &SmolStr) -> DollarName {
        let mut segments = self.0.clone();
        segments.push(segment.clone());
        DollarName(segments)
    }

    /// All proper non-empty prefixes, shortest first, each paired
    /// with the segment that follows it in `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = (DollarName, SmolStr)> + '_ {
        (0..self.0.len().saturating_sub(1)).map(move |i| {
            (
                DollarName(self.0[..i + 1].to_vec()),
                self.0[i + 1].clone(),
            )
        })
    }
}

/// Apply `aliases` to `name`: walk the segments left to right and
/// substitute any aliased prefix until a fixed point is reached.
pub(crate) fn dealias_with(
    aliases: &std::collections::BTreeMap<DollarName, DollarName>,
    name: &DollarName,
) -> DollarName {
    let mut fixed: Vec<SmolStr> = Vec::with_capacity(name.len());
    for segment in name.segments() {
        fixed.push(segment.clone());
        let mut current = DollarName::new(fixed.clone());
        while let Some(target) = aliases.get(&current) {
            current = target.clone();
        }
        fixed = current.segments().to_vec();
    }
    DollarName::new(fixed)
}

impl Display for DollarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_dotted() {
        assert_eq!(DollarName::of(&["a", "b", "c"]).to_string(), "a.b.c");
    }

    #[test]
    fn prefix_relation() {
        let parent = DollarName::of(&["a", "b"]);
        let descendant = DollarName::of(&["a", "b", "c"]);
        let other = DollarName::of(&["a", "x"]);

        assert!(parent.is_prefix_of(&descendant));
        assert!(parent.is_prefix_of(&parent));
        assert!(!parent.is_prefix_of(&other));
        assert!(!descendant.is_prefix_of(&parent));
    }

    #[test]
    fn ancestors_pair_prefix_with_next_segment() {
        let name = DollarName::of(&["a", "b", "c"]);
        let pairs: Vec<(String, String)> = name
            .ancestors()
            .map(|(prefix, seg)| (prefix.to_string(), seg.to_string()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "b".to_string()),
                ("a.b".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn names_order_component_wise() {
        let mut names = vec![
            DollarName::of(&["b"]),
            DollarName::of(&["a", "z"]),
            DollarName::of(&["a"]),
        ];
        names.sort();
        let rendered: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(rendered, vec!["a", "a.z", "b"]);
    }

    #[test]
    fn dealias_substitutes_prefixes_to_a_fixed_point() {
        use std::collections::BTreeMap;

        let mut aliases = BTreeMap::new();
        aliases.insert(DollarName::of(&["x"]), DollarName::of(&["y"]));
        aliases.insert(DollarName::of(&["y", "a"]), DollarName::of(&["z"]));

        // x.a.b -> y.a.b -> z.b
        assert_eq!(
            dealias_with(&aliases, &DollarName::of(&["x", "a", "b"])),
            DollarName::of(&["z", "b"])
        );
        // untouched names pass through
        assert_eq!(
            dealias_with(&aliases, &DollarName::of(&["q"])),
            DollarName::of(&["q"])
        );
    }

    #[test]
    fn from_value_requires_string_segments() {
        let good = Value::List(std::rc::Rc::new(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(DollarName::from_value(&good).unwrap(), DollarName::of(&["a", "b"]));

        let bad = Value::List(std::rc::Rc::new(vec![Value::Integer(1)]));
        assert!(DollarName::from_value(&bad).is_err());
    }
}
