//! Layout XLF parsing (spec.md §4.2, "layout→media map").
//!
//! A layout's on-disk XLF declares its regions and the media playing in
//! each. A `<media>` element with a `fileId` attribute references a media
//! library item directly; one without (dataset/ticker/RSS widgets that
//! carry their own data, not a library file) is addressed as a
//! layout-scoped widget-data file instead (spec.md §4.2, second
//! paragraph).

use crate::error::{ManifestError, Result};
use serde::Deserialize;
use signage_core::ContentKey;

#[derive(Debug, Deserialize)]
struct XlfLayout {
    #[serde(rename = "region", default)]
    regions: Vec<XlfRegion>,
}

#[derive(Debug, Deserialize)]
struct XlfRegion {
    #[serde(rename = "@id")]
    id: u64,
    #[serde(rename = "media", default)]
    media: Vec<XlfMedia>,
}

#[derive(Debug, Deserialize)]
struct XlfMedia {
    #[serde(rename = "@id")]
    id: u64,
    #[serde(rename = "@fileId", default)]
    file_id: Option<u64>,
}

/// Parses a layout's XLF body into the set of media/widget files it
/// references, keyed against the `layout_id` for widget composite keys.
pub fn parse_layout_xlf(layout_id: u64, xml: &str) -> Result<Vec<ContentKey>> {
    let layout: XlfLayout =
        quick_xml::de::from_str(xml).map_err(|e| ManifestError::Xlf(e.to_string()))?;

    let mut refs = Vec::new();
    for region in layout.regions {
        for media in region.media {
            let key = match media.file_id {
                Some(file_id) => ContentKey::media(file_id),
                None => ContentKey::widget(layout_id, region.id, media.id),
            };
            refs.push(key);
        }
    }
    Ok(refs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use signage_core::FileId;

    const SAMPLE: &str = r#"
        <layout width="1920" height="1080">
            <region id="1">
                <media id="501" fileId="42" type="image" duration="10" />
            </region>
            <region id="2">
                <media id="90" type="datasetview" duration="15" />
            </region>
        </layout>
    "#;

    #[test]
    fn library_media_resolves_by_file_id() {
        let refs = parse_layout_xlf(7, SAMPLE).unwrap();
        assert!(refs.contains(&ContentKey::media(42)));
    }

    #[test]
    fn widget_without_file_id_uses_composite_key() {
        let refs = parse_layout_xlf(7, SAMPLE).unwrap();
        let widget = ContentKey::widget(7, 2, 90);
        assert!(refs.contains(&widget));
        assert!(matches!(widget.id, FileId::Widget { .. }));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(parse_layout_xlf(1, "<not-xlf").is_err());
    }
}
