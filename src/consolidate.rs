//! Surface-form grouping and canonical-name election.
//!
//! The recognizer reports "U.S.", "US", "USA", and "America" as four
//! different entities; readers want one. Consolidation partitions surface
//! forms per entity kind into groups that denote the same real-world
//! entity, elects one canonical name per group, and merges document sets
//! by union so a document containing several variants counts once.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;

use crate::models::EntityKind;

/// A surface form observed in the corpus, with the documents it occurs in.
#[derive(Debug, Clone)]
pub struct SurfaceForm {
    /// The raw (validated) entity string.
    pub surface: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Documents the surface form appears in.
    pub doc_ids: BTreeSet<String>,
}

/// One consolidation group: a canonical name and the variants it absorbs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationGroup {
    /// Elected preferred surface form.
    pub canonical: String,
    /// Entity kind. Cross-kind collisions are allowed; "United States" may
    /// be a location canonical and an organization canonical independently.
    pub kind: EntityKind,
    /// Every surface form in the group, the canonical included.
    pub variants: BTreeSet<String>,
    /// Union of the variants' document sets.
    pub doc_ids: BTreeSet<String>,
}

impl ConsolidationGroup {
    /// Distinct documents containing any variant of this entity.
    pub fn document_count(&self) -> usize {
        self.doc_ids.len()
    }
}

/// Known alias groups, seeded with the spellings that dominate the corpus
/// domain: countries, agencies, newsrooms, and frequently-mentioned people.
/// Keys are canonical display forms; values are normalized variants.
static PREDEFINED_ALIASES: Lazy<Vec<(&'static str, &'static [&'static str])>> = Lazy::new(|| {
    vec![
        // Countries and regions
        ("United States", &["us", "usa", "the united states", "america", "united states"]),
        ("United Kingdom", &["uk", "britain", "england", "the uk", "united kingdom"]),
        ("European Union", &["eu", "european union"]),
        // Cities
        ("New York", &["ny", "nyc", "new york city", "new york"]),
        ("Washington", &["washington dc", "dc", "washington"]),
        ("Los Angeles", &["la", "los angeles"]),
        // Organizations
        ("FBI", &["federal bureau of investigation", "fbi"]),
        ("CIA", &["central intelligence agency", "cia"]),
        ("New York Times", &["nyt", "the new york times", "ny times", "new york times"]),
        ("Wall Street Journal", &["wsj", "the wall street journal", "wall street journal"]),
        ("Washington Post", &["the washington post", "wapo", "washington post"]),
        ("White House", &["the white house", "white house"]),
        ("Harvard University", &["harvard", "harvard university"]),
        // People
        ("Jeffrey Epstein", &["jeff epstein", "epstein", "jeffrey epstein"]),
        ("Ghislaine Maxwell", &["maxwell", "ghislaine", "g maxwell", "ghislaine maxwell"]),
        ("Donald Trump", &["trump", "donald trump"]),
        ("Bill Clinton", &["clinton", "bill clinton", "william clinton"]),
        ("Hillary Clinton", &["hillary", "hillary clinton"]),
        ("Barack Obama", &["obama", "barack obama"]),
        ("Prince Andrew", &["prince andrew"]),
        ("Alan Dershowitz", &["dershowitz", "alan dershowitz"]),
    ]
});

/// Static alias dictionary mapping normalized variants to canonical names.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    variant_to_canonical: HashMap<String, String>,
}

impl AliasMap {
    /// The built-in alias dictionary.
    pub fn builtin() -> Self {
        let mut map = Self::default();
        for (canonical, variants) in PREDEFINED_ALIASES.iter() {
            for variant in *variants {
                map.variant_to_canonical
                    .insert((*variant).to_string(), (*canonical).to_string());
            }
            // The canonical's own normalized form must resolve to itself.
            map.variant_to_canonical
                .insert(normalize_for_grouping(canonical), (*canonical).to_string());
        }
        map
    }

    /// An empty map, for callers that want pure normalization grouping.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add one alias group (canonical display form plus variants).
    pub fn insert(&mut self, canonical: &str, variants: &[&str]) {
        for variant in variants {
            self.variant_to_canonical
                .insert(normalize_for_grouping(variant), canonical.to_string());
        }
        self.variant_to_canonical
            .insert(normalize_for_grouping(canonical), canonical.to_string());
    }

    /// Canonical display form for a normalized variant, if predefined.
    pub fn canonical_for(&self, normalized: &str) -> Option<&str> {
        self.variant_to_canonical.get(normalized).map(|s| s.as_str())
    }

    /// Normalized variants registered for a canonical display form,
    /// sorted for deterministic iteration.
    pub fn variants_of(&self, canonical: &str) -> Vec<&str> {
        let mut variants: Vec<&str> = self
            .variant_to_canonical
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(v, _)| v.as_str())
            .collect();
        variants.sort_unstable();
        variants
    }
}

/// Normalize a surface form for grouping.
///
/// Beyond the matcher's lowercasing, grouping also removes dots
/// ("U.S." and "US"), a leading article, and a trailing possessive
/// ("Epstein's" and "Epstein").
pub fn normalize_for_grouping(surface: &str) -> String {
    let mut normalized = surface.to_lowercase();
    normalized = normalized.trim().to_string();

    if let Some(rest) = normalized.strip_prefix("the ") {
        normalized = rest.to_string();
    }

    if let Some(rest) = normalized.strip_suffix("'s") {
        normalized = rest.to_string();
    }

    normalized = normalized.replace('.', "");
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Partition surface forms into consolidation groups and elect canonicals.
///
/// Two surface forms share a group iff their grouping-normalized forms are
/// equal or both resolve to the same predefined alias target. Within a
/// group the canonical is the predefined target when one exists, otherwise
/// the longest surface form, breaking ties by higher document count and
/// then lexicographic order. The group's document set is the union (not the
/// sum) of its variants' document sets.
///
/// Deterministic for fixed inputs and alias map.
pub fn consolidate(surface_forms: Vec<SurfaceForm>, aliases: &AliasMap) -> Vec<ConsolidationGroup> {
    // Group key: (kind, alias target | normalized form).
    let mut groups: BTreeMap<(EntityKind, String), Vec<SurfaceForm>> = BTreeMap::new();

    for form in surface_forms {
        let normalized = normalize_for_grouping(&form.surface);
        let key = match aliases.canonical_for(&normalized) {
            Some(canonical) => format!("alias\u{1}{canonical}"),
            None => format!("norm\u{1}{normalized}"),
        };
        groups.entry((form.kind, key)).or_default().push(form);
    }

    let mut result = Vec::with_capacity(groups.len());

    for ((kind, key), members) in groups {
        let canonical = match key.split_once('\u{1}') {
            Some(("alias", target)) => target.to_string(),
            _ => elect_canonical(&members),
        };

        let mut variants = BTreeSet::new();
        let mut doc_ids = BTreeSet::new();
        for member in &members {
            variants.insert(member.surface.clone());
            doc_ids.extend(member.doc_ids.iter().cloned());
        }
        variants.insert(canonical.clone());

        result.push(ConsolidationGroup {
            canonical,
            kind,
            variants,
            doc_ids,
        });
    }

    result
}

/// Longest surface form, then highest document count, then lexicographic.
fn elect_canonical(members: &[SurfaceForm]) -> String {
    members
        .iter()
        .max_by(|a, b| {
            a.surface
                .chars()
                .count()
                .cmp(&b.surface.chars().count())
                .then(a.doc_ids.len().cmp(&b.doc_ids.len()))
                // Reverse so that on full ties max_by picks the
                // lexicographically smallest surface.
                .then(b.surface.cmp(&a.surface))
        })
        .map(|m| m.surface.clone())
        .expect("consolidation groups are never empty")
}

/// Map every variant surface form to its canonical, per kind.
///
/// Used after consolidation to rewrite per-document entity sets.
pub fn canonical_lookup(groups: &[ConsolidationGroup]) -> HashMap<(EntityKind, String), String> {
    let mut lookup = HashMap::new();
    for group in groups {
        for variant in &group.variants {
            lookup.insert((group.kind, variant.clone()), group.canonical.clone());
        }
    }
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(surface: &str, kind: EntityKind, docs: &[&str]) -> SurfaceForm {
        SurfaceForm {
            surface: surface.to_string(),
            kind,
            doc_ids: docs.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn grouping_normalization() {
        assert_eq!(normalize_for_grouping("U.S."), "us");
        assert_eq!(normalize_for_grouping("The White House"), "white house");
        assert_eq!(normalize_for_grouping("Epstein's"), "epstein");
        assert_eq!(normalize_for_grouping("  New   York  "), "new york");
    }

    #[test]
    fn predefined_aliases_merge_into_one_group() {
        let docs_a: Vec<String> = (0..10).map(|i| format!("d{i}")).collect();
        let docs_b: Vec<String> = (5..10).map(|i| format!("d{i}")).collect();
        let docs_c: Vec<String> = (0..30).map(|i| format!("d{i}")).collect();
        let docs_d: Vec<String> = (27..30).map(|i| format!("d{i}")).collect();

        fn as_refs(v: &Vec<String>) -> Vec<&str> {
            v.iter().map(|s| s.as_str()).collect()
        }
        let forms = vec![
            form("U.S.", EntityKind::Location, &as_refs(&docs_a)),
            form("US", EntityKind::Location, &as_refs(&docs_b)),
            form("United States", EntityKind::Location, &as_refs(&docs_c)),
            form("America", EntityKind::Location, &as_refs(&docs_d)),
        ];

        let groups = consolidate(forms, &AliasMap::builtin());
        assert_eq!(groups.len(), 1);

        let group = &groups[0];
        assert_eq!(group.canonical, "United States");
        // Union, not sum: 10 + 5 + 30 + 3 mentions but only 30 distinct docs.
        assert_eq!(group.document_count(), 30);
        assert!(group.variants.contains("U.S."));
        assert!(group.variants.contains("America"));
    }

    #[test]
    fn normalization_equality_groups_without_aliases() {
        let forms = vec![
            form("Epstein's", EntityKind::Person, &["d1"]),
            form("epstein", EntityKind::Person, &["d2"]),
        ];
        let groups = consolidate(forms, &AliasMap::empty());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].doc_ids.len(), 2);
    }

    #[test]
    fn canonical_election_prefers_longest_then_count_then_lex() {
        let forms = vec![
            form("G Maxwells", EntityKind::Person, &["d1"]),
            form("g maxwells", EntityKind::Person, &["d1", "d2"]),
        ];
        // Same length: higher doc count wins.
        let groups = consolidate(forms, &AliasMap::empty());
        assert_eq!(groups[0].canonical, "g maxwells");

        let forms = vec![
            form("abc corp", EntityKind::Organization, &["d1"]),
            form("ABC Corp", EntityKind::Organization, &["d1"]),
        ];
        // Full tie: lexicographically smaller surface.
        let groups = consolidate(forms, &AliasMap::empty());
        assert_eq!(groups[0].canonical, "ABC Corp");
    }

    #[test]
    fn cross_kind_collisions_stay_separate() {
        let forms = vec![
            form("United States", EntityKind::Location, &["d1"]),
            form("United States", EntityKind::Organization, &["d2"]),
        ];
        let groups = consolidate(forms, &AliasMap::builtin());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn every_variant_maps_to_exactly_one_canonical_per_kind() {
        let forms = vec![
            form("U.S.", EntityKind::Location, &["d1"]),
            form("USA", EntityKind::Location, &["d2"]),
            form("Paris", EntityKind::Location, &["d3"]),
            form("Ghislaine Maxwell", EntityKind::Person, &["d1"]),
            form("G. Maxwell", EntityKind::Person, &["d4"]),
        ];
        let groups = consolidate(forms, &AliasMap::builtin());
        let lookup = canonical_lookup(&groups);

        let mut seen: BTreeMap<(EntityKind, &str), BTreeSet<&str>> = BTreeMap::new();
        for ((kind, variant), canonical) in &lookup {
            seen.entry((*kind, variant.as_str()))
                .or_default()
                .insert(canonical.as_str());
        }
        for (key, canonicals) in seen {
            assert_eq!(canonicals.len(), 1, "variant {key:?} in multiple groups");
        }
    }

    #[test]
    fn consolidation_is_deterministic() {
        let build = || {
            let forms = vec![
                form("U.S.", EntityKind::Location, &["d1", "d2"]),
                form("America", EntityKind::Location, &["d3"]),
                form("Paris", EntityKind::Location, &["d1"]),
                form("Maxwell", EntityKind::Person, &["d2"]),
            ];
            consolidate(forms, &AliasMap::builtin())
        };
        assert_eq!(build(), build());
    }
}
