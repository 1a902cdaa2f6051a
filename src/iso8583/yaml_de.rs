//! This module contains implementation of spec deserialization logic from a YAML file

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::iso8583::iso_spec::{ElementSpec, Spec};
use crate::iso8583::IsoError;

#[derive(Serialize, Deserialize)]
pub struct YSpec {
    pub name: String,
    pub elements: Vec<ElementSpec>,
}

impl From<YSpec> for Spec {
    fn from(y_spec: YSpec) -> Spec {
        Spec::from_elements(&y_spec.name, y_spec.elements)
    }
}

pub fn read_spec(spec_file: &str) -> Result<Spec, IsoError> {
    let mut f = std::fs::File::open(spec_file)
        .map_err(|e| IsoError::Format(format!("failed to open spec file {}: {}", spec_file, e)))?;

    let mut yaml_str = String::new();
    f.read_to_string(&mut yaml_str)
        .map_err(|e| IsoError::Format(format!("failed to read spec file {}: {}", spec_file, e)))?;

    match serde_yaml::from_str::<YSpec>(&yaml_str) {
        Ok(y_spec) => Ok(y_spec.into()),
        Err(e) => Err(IsoError::Format(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso8583::iso_spec::LengthType;

    #[test]
    fn test_deserialize_yaml_spec() {
        let spec = read_spec("sample_spec/sample_spec.yaml").unwrap();

        assert_eq!(spec.name(), "SampleSpec");
        assert_eq!(spec.by_position(3).unwrap().max_length, 6);
        assert_eq!(spec.by_position(63).unwrap().length_type, LengthType::LLLVar);
        assert!(spec.by_position(99).is_none());
    }
}
