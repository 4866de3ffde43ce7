use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, SignMatchError};
use crate::models::Rect;

/// A labeled object in a training image
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledBox {
    pub rect: Rect,
    /// Excluded from training and evaluation, but not treated as background
    pub ignore: bool,
}

#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub boxes: Vec<LabeledBox>,
}

impl LabeledImage {
    pub fn truth(&self) -> impl Iterator<Item = &Rect> {
        self.boxes.iter().filter(|b| !b.ignore).map(|b| &b.rect)
    }

    pub fn ignored(&self) -> impl Iterator<Item = &Rect> {
        self.boxes.iter().filter(|b| b.ignore).map(|b| &b.rect)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub images: Vec<LabeledImage>,
}

impl Dataset {
    /// Parse an imglab XML file. Relative image paths resolve against the
    /// XML file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| SignMatchError::Dataset {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let contents = decode_text(bytes);
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&contents, base).map_err(|message| SignMatchError::Dataset {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse imglab XML text, resolving image paths against `base`
    pub fn parse(xml: &str, base: &Path) -> std::result::Result<Self, String> {
        let raw: DatasetXml = quick_xml::de::from_str(xml).map_err(|e| e.to_string())?;

        let images = raw
            .images
            .images
            .into_iter()
            .map(|image| {
                let file = PathBuf::from(&image.file);
                let path = if file.is_absolute() { file } else { base.join(file) };
                let boxes = image
                    .boxes
                    .into_iter()
                    .map(|b| LabeledBox {
                        rect: Rect::from_xywh(b.left, b.top, b.width, b.height),
                        ignore: matches!(b.ignore.as_deref(), Some("1") | Some("true")),
                    })
                    .collect();
                LabeledImage { path, boxes }
            })
            .collect();

        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Count of boxes used for training
    pub fn truth_count(&self) -> usize {
        self.images.iter().map(|image| image.truth().count()).sum()
    }
}

/// UTF-8 when valid, otherwise ISO-8859-1 (imglab's declared encoding),
/// where every byte is the code point of the same value.
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

#[derive(Deserialize)]
struct DatasetXml {
    #[serde(default)]
    images: ImagesXml,
}

#[derive(Deserialize, Default)]
struct ImagesXml {
    #[serde(rename = "image", default)]
    images: Vec<ImageXml>,
}

#[derive(Deserialize)]
struct ImageXml {
    #[serde(rename = "@file")]
    file: String,
    #[serde(rename = "box", default)]
    boxes: Vec<BoxXml>,
}

#[derive(Deserialize)]
struct BoxXml {
    #[serde(rename = "@top")]
    top: i32,
    #[serde(rename = "@left")]
    left: i32,
    #[serde(rename = "@width")]
    width: u32,
    #[serde(rename = "@height")]
    height: u32,
    #[serde(rename = "@ignore", default)]
    ignore: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='ISO-8859-1'?>
<?xml-stylesheet type='text/xsl' href='image_metadata_stylesheet.xsl'?>
<dataset>
<name>Speed limit signs</name>
<comment>Labeled with imglab</comment>
<images>
  <image file='photos/one.jpg'>
    <box top='10' left='20' width='30' height='40'/>
    <box top='100' left='120' width='35' height='35' ignore='1'/>
  </image>
  <image file='/abs/two.jpg'>
    <box top='5' left='6' width='7' height='8'>
      <label>sign</label>
    </box>
  </image>
  <image file='empty.jpg'>
  </image>
</images>
</dataset>
"#;

    #[test]
    fn parses_boxes_and_ignore_flags() {
        let dataset = Dataset::parse(SAMPLE, Path::new("/data")).unwrap();
        assert_eq!(dataset.len(), 3);
        let first = &dataset.images[0];
        assert_eq!(first.path, PathBuf::from("/data/photos/one.jpg"));
        assert_eq!(first.boxes.len(), 2);
        assert_eq!(first.boxes[0].rect, Rect::new(20, 10, 49, 49));
        assert!(!first.boxes[0].ignore);
        assert!(first.boxes[1].ignore);
        assert_eq!(dataset.truth_count(), 2);
    }

    #[test]
    fn keeps_absolute_paths() {
        let dataset = Dataset::parse(SAMPLE, Path::new("/data")).unwrap();
        assert_eq!(dataset.images[1].path, PathBuf::from("/abs/two.jpg"));
        assert!(dataset.images[2].boxes.is_empty());
    }

    #[test]
    fn latin1_file_names_are_decoded() {
        assert_eq!(decode_text(b"caf\xe9.jpg".to_vec()), "caf\u{e9}.jpg");
        assert_eq!(decode_text("caf\u{e9}.jpg".as_bytes().to_vec()), "caf\u{e9}.jpg");
    }

    #[test]
    fn loads_latin1_dataset_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let xml = dir.path().join("signs.xml");
        let mut contents = b"<?xml version='1.0' encoding='ISO-8859-1'?>\n<dataset><images><image file='stra".to_vec();
        contents.push(0xdf);
        contents.extend_from_slice(b"e.jpg'><box top='1' left='2' width='3' height='4'/></image></images></dataset>");
        std::fs::write(&xml, contents).unwrap();

        let dataset = Dataset::load(&xml).unwrap();
        assert_eq!(dataset.images[0].path, dir.path().join("stra\u{df}e.jpg"));
        assert_eq!(dataset.images[0].boxes[0].rect, Rect::from_xywh(2, 1, 3, 4));
    }

    #[test]
    fn missing_dataset_names_its_path() {
        let err = Dataset::load(Path::new("/nonexistent/signs.xml")).unwrap_err();
        match err {
            SignMatchError::Dataset { path, .. } => assert_eq!(path, PathBuf::from("/nonexistent/signs.xml")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(Dataset::parse("<dataset><images><image>", Path::new(".")).is_err());
    }
}
