//! Time dimension lookup in WMS 1.3.0 GetCapabilities documents.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::fetch_error::FetchError;

#[derive(Debug, Default)]
struct LayerFrame {
    name: Option<String>,
    time: Option<String>,
}

/// Find the `<Dimension name="time">` text declared for `layer_id`.
///
/// Dimensions are inherited in WMS, so a named layer without its own time
/// dimension takes the nearest enclosing layer's.
pub fn find_time_dimension(xml: &str, layer_id: &str) -> Result<String, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut frames: Vec<LayerFrame> = Vec::new();
    let mut in_time_dimension = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FetchError::Capabilities(e.to_string()))?;

        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"Layer" {
                    frames.push(LayerFrame::default());
                }
                if local == b"Dimension" && parent_is_layer(&path) {
                    in_time_dimension = is_time_dimension(&e)?;
                }
                path.push(local);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| FetchError::Capabilities(e.to_string()))?
                    .trim()
                    .to_string();
                let Some(frame) = frames.last_mut() else {
                    continue;
                };
                match path.last().map(Vec::as_slice) {
                    Some(b"Name") if parent_is_layer(&path[..path.len() - 1]) => {
                        if frame.name.is_none() {
                            frame.name = Some(text);
                        }
                    }
                    Some(b"Dimension") if in_time_dimension => {
                        frame.time.get_or_insert_with(String::new).push_str(&text);
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                path.pop();
                match e.local_name().as_ref() {
                    b"Dimension" => in_time_dimension = false,
                    b"Layer" => {
                        let Some(frame) = frames.pop() else {
                            continue;
                        };
                        if frame.name.as_deref() == Some(layer_id) {
                            let inherited = frames.iter().rev().find_map(|f| f.time.clone());
                            return frame
                                .time
                                .or(inherited)
                                .filter(|t| !t.is_empty())
                                .ok_or_else(|| FetchError::MissingTimeDimension(layer_id.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(FetchError::MissingTimeDimension(layer_id.to_string()))
}

fn parent_is_layer(path: &[Vec<u8>]) -> bool {
    path.last().map(Vec::as_slice) == Some(b"Layer".as_slice())
}

fn is_time_dimension(element: &BytesStart<'_>) -> Result<bool, FetchError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| FetchError::Capabilities(e.to_string()))?;
        if attr.key.local_name().as_ref() == b"name" {
            let value = attr
                .unescape_value()
                .map_err(|e| FetchError::Capabilities(e.to_string()))?;
            return Ok(value.eq_ignore_ascii_case("time"));
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms">
  <Service><Name>WMS</Name></Service>
  <Capability>
    <Layer>
      <Title>MSC GeoMet</Title>
      <Layer queryable="0">
        <Name>GDPS</Name>
        <Title>Global Deterministic Prediction System</Title>
        <Layer queryable="1">
          <Name>GDPS.ETA_TT</Name>
          <Title>Air temperature</Title>
          <Dimension name="time" units="ISO8601" default="2025-01-10T00:00:00Z">2025-01-10T00:00:00Z/2025-01-20T00:00:00Z/PT3H</Dimension>
          <Dimension name="reference_time" units="ISO8601">2025-01-09T00:00:00Z/2025-01-10T00:00:00Z/PT12H</Dimension>
          <Style><Name>TEMPERATURE</Name></Style>
        </Layer>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

    #[test]
    fn test_finds_time_dimension() {
        let time = find_time_dimension(CAPABILITIES, "GDPS.ETA_TT").unwrap();
        assert_eq!(time, "2025-01-10T00:00:00Z/2025-01-20T00:00:00Z/PT3H");
    }

    #[test]
    fn test_style_name_does_not_shadow_layer() {
        let result = find_time_dimension(CAPABILITIES, "TEMPERATURE");
        assert!(matches!(result, Err(FetchError::MissingTimeDimension(_))));
    }

    #[test]
    fn test_unknown_layer() {
        let result = find_time_dimension(CAPABILITIES, "GDPS.ETA_HR");
        assert!(matches!(result, Err(FetchError::MissingTimeDimension(_))));
    }

    #[test]
    fn test_layer_without_dimension() {
        let result = find_time_dimension(CAPABILITIES, "GDPS");
        assert!(matches!(result, Err(FetchError::MissingTimeDimension(_))));
    }

    #[test]
    fn test_inherits_parent_dimension() {
        let xml = r#"<WMS_Capabilities><Capability>
            <Layer><Name>GEPS</Name>
              <Dimension name="TIME" units="ISO8601">2025-01-10T00:00:00Z/2025-01-26T00:00:00Z/PT24H</Dimension>
              <Layer><Name>GEPS.DIAG.24_RNMM.ERGE1</Name></Layer>
            </Layer>
        </Capability></WMS_Capabilities>"#;
        let time = find_time_dimension(xml, "GEPS.DIAG.24_RNMM.ERGE1").unwrap();
        assert!(time.ends_with("PT24H"));
    }

    #[test]
    fn test_malformed_xml() {
        let result = find_time_dimension("<Layer><Name>X</Layer>", "X");
        assert!(result.is_err());
    }
}
