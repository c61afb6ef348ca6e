use std::cmp::Ordering;

/// A version string published by a registry, parsed for ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryVersion {
    pub original: String,
    kind: VersionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionKind {
    Semantic(semver::Version),
    Numeric(Vec<u64>),
    Opaque,
}

const UNSTABLE_MARKERS: &[&str] = &[
    "alpha", "beta", "rc", "snapshot", "preview", "canary", "dev", "eap", "milestone",
];

impl RegistryVersion {
    pub fn parse(version: &str) -> Self {
        let trimmed = version.trim();
        let kind = if let Ok(v) = semver::Version::parse(trimmed) {
            VersionKind::Semantic(v)
        } else if let Some(numbers) = Self::parse_numeric(trimmed) {
            VersionKind::Numeric(numbers)
        } else {
            VersionKind::Opaque
        };

        Self {
            original: version.to_string(),
            kind,
        }
    }

    fn parse_numeric(version: &str) -> Option<Vec<u64>> {
        version
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()
            .filter(|parts| !parts.is_empty())
    }

    pub fn is_stable(&self) -> bool {
        let lower = self.original.to_ascii_lowercase();
        if UNSTABLE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return false;
        }

        match &self.kind {
            VersionKind::Semantic(v) => v.pre.is_empty(),
            VersionKind::Numeric(_) => true,
            VersionKind::Opaque => !lower.contains('-'),
        }
    }

    fn numeric_parts(&self) -> Option<Vec<u64>> {
        match &self.kind {
            VersionKind::Semantic(v) => Some(vec![v.major, v.minor, v.patch]),
            VersionKind::Numeric(parts) => Some(parts.clone()),
            VersionKind::Opaque => None,
        }
    }
}

impl PartialOrd for RegistryVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegistryVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (VersionKind::Semantic(a), VersionKind::Semantic(b)) = (&self.kind, &other.kind) {
            return a.cmp(b);
        }

        match (self.numeric_parts(), other.numeric_parts()) {
            (Some(a), Some(b)) => {
                let width = a.len().max(b.len());
                let pad = |parts: &[u64]| {
                    let mut padded = parts.to_vec();
                    padded.resize(width, 0);
                    padded
                };
                pad(&a)
                    .cmp(&pad(&b))
                    .then_with(|| self.original.cmp(&other.original))
            }
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.original.cmp(&other.original),
        }
    }
}

/// Highest version in `versions`, preferring stable releases when any exist.
pub fn pick_latest<S: AsRef<str>>(versions: &[S]) -> Option<String> {
    let parsed: Vec<RegistryVersion> = versions
        .iter()
        .map(|v| RegistryVersion::parse(v.as_ref()))
        .collect();

    let stable_max = parsed.iter().filter(|v| v.is_stable()).max();
    stable_max
        .or_else(|| parsed.iter().max())
        .map(|v| v.original.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_semantic_and_numeric_versions() {
        assert!(RegistryVersion::parse("1.0.1") > RegistryVersion::parse("1.0.0"));
        assert!(RegistryVersion::parse("4.0.0.1") > RegistryVersion::parse("4.0.0"));
        assert!(RegistryVersion::parse("1.10") > RegistryVersion::parse("1.9"));
    }

    #[test]
    fn detects_unstable_versions() {
        assert!(RegistryVersion::parse("1.0.0").is_stable());
        assert!(!RegistryVersion::parse("1.0.0-alpha").is_stable());
        assert!(!RegistryVersion::parse("2.0-SNAPSHOT").is_stable());
        assert!(!RegistryVersion::parse("6.0.0-preview.1").is_stable());
    }

    #[test]
    fn picks_latest_stable_over_prerelease() {
        let versions = ["1.0.0", "1.1.0-beta.1", "1.0.2"];
        assert_eq!(pick_latest(&versions), Some("1.0.2".to_string()));
    }

    #[test]
    fn falls_back_to_prerelease_when_nothing_is_stable() {
        let versions = ["1.0.0-rc.1", "1.0.0-rc.2"];
        assert_eq!(pick_latest(&versions), Some("1.0.0-rc.2".to_string()));
        assert_eq!(pick_latest::<&str>(&[]), None);
    }
}
