use std::collections::HashMap;

use crate::kml::geometry::RawGeometry;

/// One placemark as read from KML. `geometry` is `None` for placemarks without one.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    pub geometry: Option<RawGeometry>,
    // TODO support typed values. KML ExtendedData can declare int/double fields through a Schema.
    pub attributes: HashMap<String, String>,
}

impl SourceFeature {
    /// Case-sensitive attribute lookup.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl From<RawGeometry> for SourceFeature {
    fn from(value: RawGeometry) -> Self {
        Self {
            geometry: Some(value),
            attributes: HashMap::new(),
        }
    }
}
