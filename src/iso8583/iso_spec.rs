//! Field specification tables - one [ElementSpec] per position describing how
//! the value at that position is laid out on the wire. Tables are built once
//! (in code or via [crate::iso8583::yaml_de]) and shared read-only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

lazy_static! {
    static ref ALL_SPECS: HashMap<String, Spec> = {
        let mut specs = HashMap::new();

        specs.insert("SampleSpec".to_string(), Spec::from_elements(
            "SampleSpec",
            vec![
                ElementSpec { position: 2, data_type: DataType::Numeric, length_type: LengthType::LLVar, max_length: 19 },
                ElementSpec { position: 3, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 6 },
                ElementSpec { position: 4, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 12 },
                ElementSpec { position: 7, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 10 },
                ElementSpec { position: 11, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 6 },
                ElementSpec { position: 14, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 4 },
                ElementSpec { position: 32, data_type: DataType::Numeric, length_type: LengthType::LLVar, max_length: 11 },
                ElementSpec { position: 37, data_type: DataType::Alphanumeric, length_type: LengthType::Fixed, max_length: 12 },
                ElementSpec { position: 39, data_type: DataType::Alphanumeric, length_type: LengthType::Fixed, max_length: 2 },
                ElementSpec { position: 41, data_type: DataType::Alphanumeric, length_type: LengthType::Fixed, max_length: 8 },
                ElementSpec { position: 48, data_type: DataType::Alphanumeric, length_type: LengthType::LLLVar, max_length: 999 },
                ElementSpec { position: 63, data_type: DataType::Alphanumeric, length_type: LengthType::LLLVar, max_length: 999 },
                ElementSpec { position: 70, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 3 },
                ElementSpec { position: 90, data_type: DataType::Numeric, length_type: LengthType::Fixed, max_length: 42 },
                ElementSpec { position: 128, data_type: DataType::Alphanumeric, length_type: LengthType::Fixed, max_length: 16 },
            ],
        ));

        specs
    };
}

/// Returns a registered spec table by name.
pub fn spec(name: &str) -> &'static Spec {
    ALL_SPECS.get(name).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Fixed-width values are left-padded with '0'.
    Numeric,
    /// Fixed-width values are right-padded with spaces.
    Alphanumeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthType {
    /// No length prefix; the width is the spec's max length.
    #[serde(rename = "fixed")]
    Fixed,
    /// 2 decimal prefix digits.
    #[serde(rename = "llvar")]
    LLVar,
    /// 3 decimal prefix digits.
    #[serde(rename = "lllvar")]
    LLLVar,
}

/// Layout of a single field position (1-128).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSpec {
    pub position: u32,
    pub data_type: DataType,
    pub length_type: LengthType,
    pub max_length: usize,
}

/// Spec is the definition of a message layout - which positions exist and how
/// each is encoded.
#[derive(Debug, Clone)]
pub struct Spec {
    name: String,
    elements: HashMap<u32, ElementSpec>,
}

impl Spec {
    pub fn from_elements(name: &str, elements: Vec<ElementSpec>) -> Spec {
        Spec {
            name: name.to_string(),
            elements: elements.into_iter().map(|e| (e.position, e)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn by_position(&self, pos: u32) -> Option<&ElementSpec> {
        self.elements.get(&pos)
    }
}
