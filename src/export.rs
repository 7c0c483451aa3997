//! CSV export of entity statistics.
//!
//! Three layouts, all UTF-8 with RFC-style double-quote escaping:
//!
//! 1. **Frequencies** — `Entity Type, Entity, Document Count`, sorted by
//!    type then descending count.
//! 2. **Documents** — `Entity, Document Count, Document IDs` for one
//!    entity kind, document ids semicolon-joined inside one quoted field.
//! 3. **Co-occurrence matrix** — square matrix over the most frequent
//!    entities of one kind; cell = number of documents containing both,
//!    diagonal 0 by convention.

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::Result;

use crate::models::EntityKind;
use crate::store::MetadataStore;

/// Quote a CSV field when needed; quotes inside are doubled.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row<W: Write>(out: &mut W, fields: &[&str]) -> Result<()> {
    let line = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    writeln!(out, "{line}")?;
    Ok(())
}

/// Export every entity kind's canonical names with document counts.
pub async fn export_frequencies<W: Write>(store: &MetadataStore, out: &mut W) -> Result<()> {
    write_row(out, &["Entity Type", "Entity", "Document Count"])?;

    for kind in EntityKind::ALL {
        // Store order is already count-descending with name tie-breaks.
        for (name, count) in store.frequencies(kind).await? {
            write_row(out, &[kind.label(), &name, &count.to_string()])?;
        }
    }

    Ok(())
}

/// Export one kind's entities with the documents containing them.
pub async fn export_documents<W: Write>(
    store: &MetadataStore,
    kind: EntityKind,
    out: &mut W,
) -> Result<()> {
    write_row(out, &["Entity", "Document Count", "Document IDs"])?;

    for (name, count) in store.frequencies(kind).await? {
        let doc_ids = store.documents_with(&name, kind).await?;
        write_row(out, &[&name, &count.to_string(), &doc_ids.join(";")])?;
    }

    Ok(())
}

/// Export a square co-occurrence matrix over the `limit` most frequent
/// entities of `kind`.
pub async fn export_cooccurrence<W: Write>(
    store: &MetadataStore,
    kind: EntityKind,
    limit: usize,
    out: &mut W,
) -> Result<()> {
    let names: Vec<String> = store
        .frequencies(kind)
        .await?
        .into_iter()
        .take(limit)
        .map(|(name, _)| name)
        .collect();

    let mut doc_sets: Vec<BTreeSet<String>> = Vec::with_capacity(names.len());
    for name in &names {
        doc_sets.push(store.documents_with(name, kind).await?.into_iter().collect());
    }

    let mut header: Vec<&str> = vec![""];
    header.extend(names.iter().map(|n| n.as_str()));
    write_row(out, &header)?;

    for (i, name) in names.iter().enumerate() {
        let mut row: Vec<String> = vec![name.clone()];
        for j in 0..names.len() {
            let count = if i == j {
                0
            } else {
                doc_sets[i].intersection(&doc_sets[j]).count()
            };
            row.push(count.to_string());
        }
        let fields: Vec<&str> = row.iter().map(|s| s.as_str()).collect();
        write_row(out, &fields)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    async fn seeded_store() -> MetadataStore {
        let store = MetadataStore::in_memory().await.unwrap();

        let mut d1 = DocumentMetadata {
            doc_id: "d1".to_string(),
            word_count: 10,
            ..DocumentMetadata::default()
        };
        d1.people.insert("Jeffrey Epstein".to_string());
        d1.people.insert("Ghislaine Maxwell".to_string());
        d1.locations.insert("Paris".to_string());
        store.put(&d1, "d1.txt", "fp").await.unwrap();

        let mut d2 = DocumentMetadata {
            doc_id: "d2".to_string(),
            word_count: 10,
            ..DocumentMetadata::default()
        };
        d2.people.insert("Jeffrey Epstein".to_string());
        d2.locations.insert("Paris".to_string());
        store.put(&d2, "d2.txt", "fp").await.unwrap();

        store
    }

    #[tokio::test]
    async fn frequencies_layout() {
        let store = seeded_store().await;
        let mut out = Vec::new();
        export_frequencies(&store, &mut out).await.unwrap();
        let csv = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Entity Type,Entity,Document Count");
        assert_eq!(lines[1], "people,Jeffrey Epstein,2");
        assert_eq!(lines[2], "people,Ghislaine Maxwell,1");
        assert!(lines.contains(&"locations,Paris,2"));
    }

    #[tokio::test]
    async fn documents_layout_joins_ids() {
        let store = seeded_store().await;
        let mut out = Vec::new();
        export_documents(&store, EntityKind::Person, &mut out)
            .await
            .unwrap();
        let csv = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Entity,Document Count,Document IDs");
        assert_eq!(lines[1], "Jeffrey Epstein,2,d1;d2");
        assert_eq!(lines[2], "Ghislaine Maxwell,1,d1");
    }

    #[tokio::test]
    async fn cooccurrence_matrix_is_square_with_zero_diagonal() {
        let store = seeded_store().await;
        let mut out = Vec::new();
        export_cooccurrence(&store, EntityKind::Person, 10, &mut out)
            .await
            .unwrap();
        let csv = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], ",Jeffrey Epstein,Ghislaine Maxwell");
        // Epstein row: diagonal 0, shares d1 with Maxwell.
        assert_eq!(lines[1], "Jeffrey Epstein,0,1");
        assert_eq!(lines[2], "Ghislaine Maxwell,1,0");
    }

    #[test]
    fn csv_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("has,comma"), "\"has,comma\"");
        assert_eq!(csv_field("has \"quote\""), "\"has \"\"quote\"\"\"");
    }

    #[tokio::test]
    async fn empty_store_exports_headers_only() {
        let store = MetadataStore::in_memory().await.unwrap();
        let mut out = Vec::new();
        export_frequencies(&store, &mut out).await.unwrap();
        let csv = String::from_utf8(out).unwrap();
        assert_eq!(csv.lines().count(), 1);

        let mut out = Vec::new();
        export_cooccurrence(&store, EntityKind::Person, 10, &mut out)
            .await
            .unwrap();
        let csv = String::from_utf8(out).unwrap();
        // Just the empty-corner header.
        assert_eq!(csv.lines().count(), 1);
    }
}
