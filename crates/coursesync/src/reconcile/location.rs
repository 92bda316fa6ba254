//! Classification of free-text meeting locations.

use crate::db::InstructionType;
use regex::Regex;
use std::sync::LazyLock;

static ONLINE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bonline\b").unwrap());
static REMOTE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bremote\b").unwrap());
// "<building words> <room>", where the room token carries at least one digit.
static BUILDING_ROOM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<building>[A-Za-z][A-Za-z.&'\- ]*?)\s+(?P<room>[A-Za-z]*\d[A-Za-z0-9\-]*)$")
        .unwrap()
});

/// Result of classifying a location string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedLocation {
    Online,
    Remote,
    /// `building` is the building text as written; it may not be a known building.
    Physical { building: String, room: String },
    Unknown,
}

impl ClassifiedLocation {
    pub fn instruction_type(&self) -> InstructionType {
        match self {
            ClassifiedLocation::Online => InstructionType::Online,
            ClassifiedLocation::Remote => InstructionType::Remote,
            ClassifiedLocation::Physical { .. } => InstructionType::Physical,
            ClassifiedLocation::Unknown => InstructionType::Unknown,
        }
    }
}

/// Classifies locations against a fixed list of known building names.
#[derive(Debug, Clone, Default)]
pub struct LocationClassifier {
    /// Longest first, so "Fisher Hall Annex" wins over "Fisher Hall".
    buildings: Vec<String>,
}

impl LocationClassifier {
    pub fn new<I, S>(buildings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut buildings: Vec<String> = buildings
            .into_iter()
            .map(Into::into)
            .filter(|b| !b.is_empty())
            .collect();
        buildings.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        buildings.dedup();

        Self { buildings }
    }

    /// Returns true if `name` is one of the known buildings.
    pub fn is_known(&self, name: &str) -> bool {
        self.buildings.iter().any(|b| b == name)
    }

    /// Classifies a location string. Total over all inputs.
    ///
    /// Priority: online marker, remote marker, known building prefix, then
    /// any "<building> <room>" shape. Everything else is unknown.
    ///
    /// Only leading whitespace is dropped before matching, so a known
    /// building's room is the exact remainder of the input, trailing
    /// whitespace included.
    pub fn classify(&self, location: Option<&str>) -> ClassifiedLocation {
        let text = match location {
            Some(text) if !text.trim().is_empty() => text.trim_start(),
            _ => return ClassifiedLocation::Unknown,
        };

        if ONLINE_REGEX.is_match(text) {
            return ClassifiedLocation::Online;
        }
        if REMOTE_REGEX.is_match(text) {
            return ClassifiedLocation::Remote;
        }

        if let Some((building, room)) = self.match_known_prefix(text) {
            return ClassifiedLocation::Physical {
                building: building.to_string(),
                room: room.to_string(),
            };
        }

        match BUILDING_ROOM_REGEX.captures(text.trim_end()) {
            Some(caps) => ClassifiedLocation::Physical {
                building: caps["building"].trim_end().to_string(),
                room: caps["room"].to_string(),
            },
            None => ClassifiedLocation::Unknown,
        }
    }

    /// Splits `text` into a known building and the verbatim remainder after
    /// the separating whitespace character.
    fn match_known_prefix<'t>(&self, text: &'t str) -> Option<(&str, &'t str)> {
        self.buildings.iter().find_map(|building| {
            let rest = text.strip_prefix(building.as_str())?;
            if rest.is_empty() {
                return Some((building.as_str(), ""));
            }
            let mut chars = rest.chars();
            match chars.next() {
                Some(c) if c.is_whitespace() => Some((building.as_str(), chars.as_str())),
                _ => None,
            }
        })
    }
}
