//! Release version identifiers.
//!
//! Versions are parsed leniently: anything that does not start with a numeric
//! `major[.minor[.patch]]` triple still produces a [`Version`] (all-zero
//! numbers, the raw text kept as the qualifier) so that comparisons stay
//! total no matter what a release feed or a local build reports.

use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Stable,
    Dev,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Dev => "dev",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub channel: Channel,
    /// Everything after the numeric triple, without the leading `-`.
    pub suffix: Option<String>,
    pub commit_hash: Option<String>,
    parsed: bool,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            channel: Channel::Stable,
            suffix: None,
            commit_hash: None,
            parsed: true,
        }
    }

    /// Never fails; see the module docs for how unparsable input is kept.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let normalized = trimmed
            .strip_prefix(|ch: char| ch == 'v' || ch == 'V')
            .unwrap_or(trimmed);
        let (core, qualifier) = match normalized.find(|ch: char| ch == '-' || ch == '+') {
            Some(idx) => (&normalized[..idx], Some(&normalized[idx..])),
            None => (normalized, None),
        };
        let Some((major, minor, patch)) = parse_triple(core) else {
            return Self::unparsable(trimmed);
        };
        let suffix = qualifier
            .map(|value| value.strip_prefix('-').unwrap_or(value))
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self {
            major,
            minor,
            patch,
            channel: channel_of(suffix.as_deref()),
            commit_hash: suffix.as_deref().and_then(commit_hash_of),
            suffix,
            parsed: true,
        }
    }

    /// The version this binary was built as.
    pub fn current() -> Self {
        Self::parse(env!("CARGO_PKG_VERSION"))
    }

    fn unparsable(raw: &str) -> Self {
        let suffix = (!raw.is_empty()).then(|| raw.to_string());
        Self {
            major: 0,
            minor: 0,
            patch: 0,
            channel: channel_of(suffix.as_deref()),
            suffix,
            commit_hash: None,
            parsed: false,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    pub fn is_dev_build(&self) -> bool {
        self.channel == Channel::Dev
    }

    pub fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

fn parse_triple(core: &str) -> Option<(u64, u64, u64)> {
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    Some((numbers[0], numbers[1], numbers[2]))
}

fn channel_of(suffix: Option<&str>) -> Channel {
    match suffix {
        Some(value) if value.to_ascii_lowercase().contains("dev") => Channel::Dev,
        _ => Channel::Stable,
    }
}

fn commit_hash_of(suffix: &str) -> Option<String> {
    let hash = if let Some((_, build)) = suffix.rsplit_once('+') {
        build
    } else {
        let lower = suffix.to_ascii_lowercase();
        if !lower.starts_with("dev.") {
            return None;
        }
        &suffix[4..]
    };
    (!hash.is_empty()).then(|| hash.to_string())
}

/// Free-function form of [`Version::parse`].
pub fn parse(raw: &str) -> Version {
    Version::parse(raw)
}

/// True iff the qualifier contains `dev` in any case. `beta` and `rc`
/// qualifiers are pre-releases but not dev builds.
pub fn is_dev_build(version: &Version) -> bool {
    version.is_dev_build()
}

/// Numeric triple first; at an equal triple a bare release outranks any
/// qualified one; two qualifiers compare as plain strings. The last rule is
/// only a deterministic tie-break, it says nothing about which build is
/// more recent.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.triple()
        .cmp(&b.triple())
        .then_with(|| match (&a.suffix, &b.suffix) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => left.cmp(right),
        })
}

pub fn is_newer(current: &Version, candidate: &Version) -> bool {
    compare(candidate, current) == Ordering::Greater
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.parsed {
            return f.write_str(self.suffix.as_deref().unwrap_or(""));
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        match self.suffix.as_deref() {
            Some(suffix) if suffix.starts_with('+') => write!(f, "{suffix}"),
            Some(suffix) => write!(f, "-{suffix}"),
            None => Ok(()),
        }
    }
}
