//! Build manifest and generated listing of a published collection

use crate::error::Result;
use crate::layout::CollectionLayout;
use crate::types::{ArchivePart, CollectionName, ConversionStatus, ItemFailure, ItemRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contents of `manifest.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Collection name
    pub collection: CollectionName,
    /// Display title
    pub title: Option<String>,
    /// When the build finished
    pub built_at: DateTime<Utc>,
    /// Every item with its final fetch and conversion status
    pub items: Vec<ItemRecord>,
    /// Archive parts in order
    pub parts: Vec<ArchivePart>,
    /// Per-item failures
    #[serde(default)]
    pub failures: Vec<ItemFailure>,
}

impl Manifest {
    /// Normalized output file names, in item order
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|i| i.conversion == ConversionStatus::Converted)
            .filter_map(|i| i.output.as_deref())
    }

    /// Write `manifest.json` and `index.html` into the collection directory
    pub async fn write(&self, layout: &CollectionLayout) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(layout.manifest_path(), json).await?;
        tokio::fs::write(layout.index_path(), self.render_index()).await?;
        Ok(())
    }

    /// Read the manifest of a published collection, if it has one
    pub async fn read(layout: &CollectionLayout) -> Result<Option<Self>> {
        match tokio::fs::read(layout.manifest_path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Static HTML page showing every normalized output and linking the parts
    pub fn render_index(&self) -> String {
        let title = escape(self.title.as_deref().unwrap_or(self.collection.as_str()));
        let mut html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n"
        );

        html.push_str("<ul class=\"parts\">\n");
        for part in &self.parts {
            let name = escape(&part.file_name);
            html.push_str(&format!(
                "<li><a href=\"parts/{name}\">{name}</a> ({} files)</li>\n",
                part.files.len()
            ));
        }
        html.push_str("</ul>\n<div class=\"outputs\">\n");
        for output in self.outputs() {
            let name = escape(output);
            html.push_str(&format!("<img src=\"gif/{name}\" alt=\"{name}\" loading=\"lazy\">\n"));
        }
        html.push_str("</div>\n</body>\n</html>\n");
        html
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FetchStatus, ItemId, SourceFormat};

    fn manifest() -> Manifest {
        Manifest {
            collection: CollectionName::parse("Cats").unwrap(),
            title: Some("Cats <3".into()),
            built_at: Utc::now(),
            items: vec![
                ItemRecord {
                    id: ItemId::from("a"),
                    format: SourceFormat::Video,
                    fetch: FetchStatus::Fetched,
                    conversion: ConversionStatus::Converted,
                    output: Some("a.gif".into()),
                },
                ItemRecord {
                    id: ItemId::from("b"),
                    format: SourceFormat::StaticImage,
                    fetch: FetchStatus::Failed,
                    conversion: ConversionStatus::Failed,
                    output: None,
                },
            ],
            parts: vec![ArchivePart {
                index: 0,
                file_name: "Cats_0.zip".into(),
                files: vec!["a.gif".into()],
                size_bytes: 10,
            }],
            failures: vec![],
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CollectionLayout::new(dir.path(), &CollectionName::parse("Cats").unwrap());
        layout.prepare().await.unwrap();

        let manifest = manifest();
        manifest.write(&layout).await.unwrap();

        let read = Manifest::read(&layout).await.unwrap().unwrap();
        assert_eq!(read, manifest);
        assert!(layout.index_path().exists());
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CollectionLayout::new(dir.path(), &CollectionName::parse("Cats").unwrap());
        assert!(Manifest::read(&layout).await.unwrap().is_none());
    }

    #[test]
    fn test_index_lists_only_converted_outputs() {
        let html = manifest().render_index();
        assert!(html.contains("<img src=\"gif/a.gif\""));
        assert!(!html.contains("b.gif"));
        assert!(html.contains("href=\"parts/Cats_0.zip\""));
        assert!(html.contains("Cats &lt;3"));
    }
}
