use std::collections::HashMap;

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::geometry::{parse_coordinates, RawCoord, RawGeometry, RawPolygon};
use crate::error::OpenError;
use crate::geofile::feature::SourceFeature;

/// A vector layer of a KML document: one `Document` or `Folder` and the placemarks it
/// directly contains, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub features: Vec<SourceFeature>,
}

impl Layer {
    fn new(name: String) -> Self {
        Self {
            name,
            features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Boundary {
    Outer,
    Inner,
}

#[derive(Debug)]
enum GeometryFrame {
    Point(Vec<RawCoord>),
    LineString(Vec<RawCoord>),
    LinearRing(Vec<RawCoord>),
    Polygon {
        exterior: Option<Vec<RawCoord>>,
        interiors: Vec<Vec<RawCoord>>,
        boundary: Option<Boundary>,
    },
    Multi(Vec<RawGeometry>),
    /// A geometry we do not decode; everything below it is ignored.
    Opaque(String),
}

#[derive(Debug)]
enum CaptureTarget {
    LayerName(usize),
    Attribute(String),
    Coordinates,
}

#[derive(Debug)]
struct Capture {
    target: CaptureTarget,
    depth: usize,
    text: String,
}

#[derive(Debug, Default)]
struct PlacemarkBuilder {
    attributes: HashMap<String, String>,
    frames: Vec<GeometryFrame>,
    geometry: Option<RawGeometry>,
    data_name: Option<String>,
}

struct KmlParser<'a> {
    entry_name: &'a str,
    default_layer_name: String,
    layers: Vec<Layer>,
    container_stack: Vec<usize>,
    implicit_layer: Option<usize>,
    element_stack: Vec<String>,
    placemark: Option<PlacemarkBuilder>,
    capture: Option<Capture>,
}

/// Decode all layers of one KML document.
///
/// `entry_name` is the path of the document inside the KMZ archive; its file stem names
/// documents that carry no `<name>` of their own.
pub fn parse_kml_document(content: &str, entry_name: &str) -> Result<Vec<Layer>, OpenError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut parser = KmlParser::new(entry_name);
    loop {
        let event = reader.read_event().map_err(|err| OpenError::InvalidKml {
            entry: entry_name.to_string(),
            message: format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                err
            ),
        })?;
        match event {
            Event::Start(e) => parser.start_element(&e)?,
            Event::Empty(e) => {
                parser.start_element(&e)?;
                parser.end_element()?;
            }
            Event::End(_) => parser.end_element()?,
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| OpenError::InvalidKml {
                    entry: entry_name.to_string(),
                    message: format!("Could not unescape text: {}", err),
                })?;
                parser.text(&text);
            }
            Event::CData(e) => {
                let data = e.into_inner();
                parser.text(&String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    parser.finish()
}

fn is_geometry_element(name: &str) -> bool {
    matches!(
        name,
        "Point" | "LineString" | "LinearRing" | "Polygon" | "MultiGeometry"
    ) || is_opaque_geometry_element(name)
}

fn is_opaque_geometry_element(name: &str) -> bool {
    matches!(name, "Model" | "Track" | "MultiTrack")
}

impl<'a> KmlParser<'a> {
    fn new(entry_name: &'a str) -> Self {
        let default_layer_name = std::path::Path::new(entry_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry_name.to_string());
        Self {
            entry_name,
            default_layer_name,
            layers: Vec::new(),
            container_stack: Vec::new(),
            implicit_layer: None,
            element_stack: Vec::new(),
            placemark: None,
            capture: None,
        }
    }

    fn invalid(&self, message: String) -> OpenError {
        OpenError::InvalidKml {
            entry: self.entry_name.to_string(),
            message,
        }
    }

    fn parent(&self) -> Option<&str> {
        self.element_stack.last().map(String::as_str)
    }

    fn start_capture(&mut self, target: CaptureTarget) {
        if self.capture.is_none() {
            self.capture = Some(Capture {
                target,
                depth: self.element_stack.len(),
                text: String::new(),
            });
        }
    }

    fn start_element(&mut self, e: &BytesStart) -> Result<(), OpenError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        // Markup inside a captured value (e.g. unescaped HTML in a description) is not
        // interpreted, only its text is kept.
        if self.capture.is_some() {
            self.element_stack.push(name);
            return Ok(());
        }

        match name.as_str() {
            "Document" | "Folder" if self.placemark.is_none() => {
                let default_name = if name == "Document" {
                    self.default_layer_name.clone()
                } else {
                    format!("Layer #{}", self.layers.len())
                };
                self.layers.push(Layer::new(default_name));
                self.container_stack.push(self.layers.len() - 1);
            }
            "name" if self.placemark.is_none() => {
                let names_container = matches!(self.parent(), Some("Document" | "Folder"));
                if let (true, Some(layer_idx)) =
                    (names_container, self.container_stack.last().copied())
                {
                    self.start_capture(CaptureTarget::LayerName(layer_idx));
                }
            }
            "Placemark" => {
                if self.placemark.is_some() {
                    return Err(self.invalid("Nested Placemark".to_string()));
                }
                self.placemark = Some(PlacemarkBuilder::default());
            }
            _ => {
                if self.placemark.is_some() {
                    self.start_placemark_child(&name, e)?;
                }
            }
        }
        self.element_stack.push(name);
        Ok(())
    }

    fn start_placemark_child(&mut self, name: &str, e: &BytesStart) -> Result<(), OpenError> {
        let parent = self.parent().map(str::to_string);
        let in_opaque = self
            .placemark
            .as_ref()
            .map(|p| p.frames.iter().any(|f| matches!(f, GeometryFrame::Opaque(_))))
            .unwrap_or(false);
        if in_opaque {
            return Ok(());
        }

        if is_geometry_element(name) {
            let frame = match name {
                "Point" => GeometryFrame::Point(Vec::new()),
                "LineString" => GeometryFrame::LineString(Vec::new()),
                "LinearRing" => GeometryFrame::LinearRing(Vec::new()),
                "Polygon" => GeometryFrame::Polygon {
                    exterior: None,
                    interiors: Vec::new(),
                    boundary: None,
                },
                "MultiGeometry" => GeometryFrame::Multi(Vec::new()),
                other => GeometryFrame::Opaque(other.to_string()),
            };
            if let Some(placemark) = self.placemark.as_mut() {
                placemark.frames.push(frame);
            }
            return Ok(());
        }

        let attribute_name = self.data_attribute(e)?;
        let in_icon_style = self.in_placemark_icon_style();
        let (has_frames, data_name) = match self.placemark.as_ref() {
            Some(placemark) => (!placemark.frames.is_empty(), placemark.data_name.clone()),
            None => return Ok(()),
        };
        match (name, parent.as_deref()) {
            ("outerBoundaryIs" | "innerBoundaryIs", _) => {
                let side = if name == "outerBoundaryIs" {
                    Boundary::Outer
                } else {
                    Boundary::Inner
                };
                if let Some(GeometryFrame::Polygon { boundary, .. }) = self
                    .placemark
                    .as_mut()
                    .and_then(|placemark| placemark.frames.last_mut())
                {
                    *boundary = Some(side);
                }
            }
            ("coordinates", _) if has_frames => {
                self.start_capture(CaptureTarget::Coordinates);
            }
            ("name", Some("Placemark")) => {
                self.start_capture(CaptureTarget::Attribute("Name".to_string()));
            }
            ("description", Some("Placemark")) => {
                self.start_capture(CaptureTarget::Attribute("description".to_string()));
            }
            ("Snippet" | "snippet", Some("Placemark")) => {
                self.start_capture(CaptureTarget::Attribute("snippet".to_string()));
            }
            ("href", Some("Icon")) if in_icon_style => {
                self.start_capture(CaptureTarget::Attribute("icon".to_string()));
            }
            ("Data", _) => {
                if let Some(placemark) = self.placemark.as_mut() {
                    placemark.data_name = attribute_name;
                }
            }
            ("value", Some("Data")) => {
                if let Some(data_name) = data_name {
                    self.start_capture(CaptureTarget::Attribute(data_name));
                }
            }
            ("SimpleData", _) => {
                if let Some(data_name) = attribute_name {
                    self.start_capture(CaptureTarget::Attribute(data_name));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn in_placemark_icon_style(&self) -> bool {
        self.element_stack.ends_with(&[
            "Placemark".to_string(),
            "Style".to_string(),
            "IconStyle".to_string(),
            "Icon".to_string(),
        ])
    }

    fn data_attribute(&self, e: &BytesStart) -> Result<Option<String>, OpenError> {
        let local_name = e.local_name();
        if !matches!(local_name.as_ref(), b"Data" | b"SimpleData") {
            return Ok(None);
        }
        let attribute = e
            .try_get_attribute("name")
            .map_err(|err| self.invalid(format!("Invalid attribute: {}", err)))?;
        match attribute {
            Some(attribute) => {
                let value = attribute
                    .unescape_value()
                    .map_err(|err| self.invalid(format!("Invalid attribute value: {}", err)))?;
                Ok(Some(value.into_owned()))
            }
            None => Ok(None),
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            // Text events are trimmed, keep pieces split by inline markup apart.
            if !capture.text.is_empty() && !text.is_empty() {
                capture.text.push(' ');
            }
            capture.text.push_str(text);
        }
    }

    fn end_element(&mut self) -> Result<(), OpenError> {
        let name = self
            .element_stack
            .pop()
            .ok_or_else(|| self.invalid("Unbalanced closing tag".to_string()))?;

        if let Some(capture) = self.capture.take() {
            if capture.depth == self.element_stack.len() {
                self.finish_capture(capture);
            } else {
                self.capture = Some(capture);
                return Ok(());
            }
        }

        match name.as_str() {
            "Document" | "Folder" if self.placemark.is_none() => {
                self.container_stack.pop();
            }
            "Placemark" => {
                if let Some(placemark) = self.placemark.take() {
                    self.push_feature(SourceFeature {
                        geometry: placemark.geometry,
                        attributes: placemark.attributes,
                    });
                }
            }
            "Data" => {
                if let Some(placemark) = self.placemark.as_mut() {
                    placemark.data_name = None;
                }
            }
            _ => {
                if is_geometry_element(&name) {
                    self.end_geometry(&name);
                }
            }
        }
        Ok(())
    }

    fn finish_capture(&mut self, capture: Capture) {
        let text = capture.text.trim();
        match capture.target {
            CaptureTarget::LayerName(layer_idx) => {
                if !text.is_empty() {
                    if let Some(layer) = self.layers.get_mut(layer_idx) {
                        layer.name = text.to_string();
                    }
                }
            }
            CaptureTarget::Attribute(name) => {
                if let Some(placemark) = self.placemark.as_mut() {
                    placemark.attributes.insert(name, text.to_string());
                }
            }
            CaptureTarget::Coordinates => {
                let coords = parse_coordinates(text);
                let Some(placemark) = self.placemark.as_mut() else {
                    return;
                };
                match placemark.frames.last_mut() {
                    Some(GeometryFrame::Point(target))
                    | Some(GeometryFrame::LineString(target))
                    | Some(GeometryFrame::LinearRing(target)) => target.extend(coords),
                    _ => debug!("Ignoring coordinates outside of a simple geometry"),
                }
            }
        }
    }

    fn end_geometry(&mut self, name: &str) {
        let Some(placemark) = self.placemark.as_mut() else {
            return;
        };
        // Elements nested under an opaque geometry never pushed a frame.
        if let Some(GeometryFrame::Opaque(opaque)) = placemark.frames.last() {
            if opaque != name {
                return;
            }
        }
        let Some(frame) = placemark.frames.pop() else {
            return;
        };
        let geometry = match frame {
            GeometryFrame::Point(coords) => match coords.first() {
                Some(coord) => {
                    if coords.len() > 1 {
                        warn!("Point with {} coordinates, keeping the first", coords.len());
                    }
                    Some(RawGeometry::Point(*coord))
                }
                None => {
                    warn!("Ignoring Point without coordinates");
                    None
                }
            },
            GeometryFrame::LineString(coords) => Some(RawGeometry::LineString(coords)),
            GeometryFrame::LinearRing(coords) => {
                if let Some(GeometryFrame::Polygon {
                    exterior,
                    interiors,
                    boundary,
                }) = placemark.frames.last_mut()
                {
                    match boundary {
                        Some(Boundary::Inner) => interiors.push(coords),
                        _ => {
                            if exterior.is_none() {
                                *exterior = Some(coords);
                            } else {
                                warn!("Polygon with more than one outer boundary");
                            }
                        }
                    }
                    return;
                }
                Some(RawGeometry::LinearRing(coords))
            }
            GeometryFrame::Polygon {
                exterior,
                interiors,
                ..
            } => Some(RawGeometry::Polygon(RawPolygon {
                exterior: exterior.unwrap_or_default(),
                interiors,
            })),
            GeometryFrame::Multi(members) => Some(RawGeometry::from_members(members)),
            GeometryFrame::Opaque(name) => Some(RawGeometry::Other(name)),
        };
        let Some(geometry) = geometry else {
            return;
        };
        match placemark.frames.last_mut() {
            Some(GeometryFrame::Multi(members)) => members.push(geometry),
            Some(_) => debug!("Ignoring {} nested in another geometry", geometry.type_name()),
            None => {
                if placemark.geometry.is_none() {
                    placemark.geometry = Some(geometry);
                } else {
                    warn!("Placemark with more than one geometry, keeping the first");
                }
            }
        }
    }

    fn push_feature(&mut self, feature: SourceFeature) {
        let layer_idx = match self.container_stack.last() {
            Some(&idx) => idx,
            None => match self.implicit_layer {
                Some(idx) => idx,
                None => {
                    self.layers.push(Layer::new(self.default_layer_name.clone()));
                    let idx = self.layers.len() - 1;
                    self.implicit_layer = Some(idx);
                    idx
                }
            },
        };
        self.layers[layer_idx].features.push(feature);
    }

    fn finish(self) -> Result<Vec<Layer>, OpenError> {
        if !self.element_stack.is_empty() {
            return Err(self.invalid(format!(
                "Unexpected end of document inside <{}>",
                self.element_stack.join("/")
            )));
        }
        Ok(self.layers)
    }
}
