use crate::geofile::feature::SourceFeature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    /// Text of at most `width` bytes.
    Text { width: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub field_type: FieldType,
}

/// Attribute schema shared by all three output datasets, in column order.
pub const ATTRIBUTE_SCHEMA: [FieldDefinition; 6] = [
    FieldDefinition {
        name: "id",
        field_type: FieldType::Integer,
    },
    FieldDefinition {
        name: "Name",
        field_type: FieldType::Text { width: 50 },
    },
    FieldDefinition {
        name: "description",
        field_type: FieldType::Text { width: 128 },
    },
    FieldDefinition {
        name: "icon",
        field_type: FieldType::Text { width: 10 },
    },
    FieldDefinition {
        name: "snippet",
        field_type: FieldType::Text { width: 128 },
    },
    FieldDefinition {
        name: "layer_name",
        field_type: FieldType::Text { width: 50 },
    },
];

/// Source attributes copied verbatim into the output, looked up by exact name.
pub const COPIED_FIELDS: [&str; 4] = ["Name", "description", "icon", "snippet"];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i64),
    Text(&'a str),
}

/// Attribute row of one output record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeValues {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub snippet: String,
    pub layer_name: String,
}

impl AttributeValues {
    /// Values in `ATTRIBUTE_SCHEMA` order.
    pub fn field_values(&self) -> [FieldValue<'_>; 6] {
        [
            FieldValue::Integer(self.id as i64),
            FieldValue::Text(&self.name),
            FieldValue::Text(&self.description),
            FieldValue::Text(&self.icon),
            FieldValue::Text(&self.snippet),
            FieldValue::Text(&self.layer_name),
        ]
    }
}

/// Sequence shared by all families. Incremented once per source feature, before
/// classification, so dropped features leave gaps in the emitted ids.
#[derive(Debug, Default)]
pub struct FeatureCounter {
    current: u64,
}

impl FeatureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the id of the next feature. The first id is 1.
    pub fn next_id(&mut self) -> u64 {
        self.current += 1;
        self.current
    }
}

/// Build the attribute row of `feature`. Absent source attributes become empty strings.
pub fn project(feature: &SourceFeature, sequence_id: u64, layer_name: &str) -> AttributeValues {
    let copied = |name: &str| feature.lookup(name).unwrap_or_default().to_string();
    AttributeValues {
        id: sequence_id,
        name: copied(COPIED_FIELDS[0]),
        description: copied(COPIED_FIELDS[1]),
        icon: copied(COPIED_FIELDS[2]),
        snippet: copied(COPIED_FIELDS[3]),
        layer_name: layer_name.to_string(),
    }
}
