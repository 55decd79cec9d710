//! Provenance of simulated data: weighted links back to trajectory segments.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reference to one input trajectory segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Origin {
    /// Input file number.
    pub file: i32,
    /// Entry (event) number within the file.
    pub entry: i32,
    /// Index of the segment within the entry.
    pub index: i32,
}

impl Origin {
    /// Creates a new origin reference.
    #[inline]
    #[must_use]
    pub fn new(file: i32, entry: i32, index: i32) -> Self {
        Self { file, entry, index }
    }
}

/// A weighted link to an origin. The weight is the contributed charge.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Link {
    /// Referenced segment.
    pub origin: Origin,
    /// Contribution (charge in electrons).
    pub weight: f64,
}

/// Weighted list of links. Links to the same origin are kept merged.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Match {
    links: Vec<Link>,
    total_weight: f64,
}

impl Match {
    /// Creates an empty match (e.g. for noise).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a match holding a single link.
    #[must_use]
    pub fn single(origin: Origin, weight: f64) -> Self {
        let mut m = Self::new();
        m.add_link(origin, weight);
        m
    }

    /// Adds a contribution; merges with an existing link to the same origin.
    pub fn add_link(&mut self, origin: Origin, weight: f64) {
        self.total_weight += weight;
        if let Some(link) = self.links.iter_mut().find(|l| l.origin == origin) {
            link.weight += weight;
        } else {
            self.links.push(Link { origin, weight });
        }
    }

    /// Unions another match into this one.
    pub fn add_match(&mut self, other: &Match) {
        for link in &other.links {
            self.add_link(link.origin, link.weight);
        }
    }

    /// All links in insertion order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Number of distinct origins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if no origin is referenced (pure noise).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Sum of all link weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Link with the largest weight.
    #[must_use]
    pub fn matched_link(&self) -> Option<&Link> {
        self.links
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }
}

impl FromIterator<Link> for Match {
    fn from_iter<I: IntoIterator<Item = Link>>(iter: I) -> Self {
        let mut m = Match::new();
        for link in iter {
            m.add_link(link.origin, link.weight);
        }
        m
    }
}
