use super::NULL_MARKER;
use crate::record::{ElementValue, Scalar};
use crate::{DeidError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dicom_core::VR;

/// Outcome of decoding one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Present(ElementValue),
    /// The cell holds the null marker: the attribute exists without a value.
    Absent,
    Malformed(String),
}

impl Decoded {
    /// Converts into an element value, absent values becoming [`ElementValue::Empty`].
    pub fn into_value(self) -> Result<ElementValue> {
        match self {
            Decoded::Present(value) => Ok(value),
            Decoded::Absent => Ok(ElementValue::Empty),
            Decoded::Malformed(reason) => Err(DeidError::Decoding(reason)),
        }
    }
}

pub(crate) fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OW | VR::UN | VR::OF | VR::OD | VR::OL | VR::OV
    )
}

pub(crate) fn is_integer_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::IS | VR::SS | VR::SL | VR::US | VR::UL | VR::SV | VR::UV
    )
}

pub(crate) fn is_float_vr(vr: VR) -> bool {
    matches!(vr, VR::FD | VR::FL)
}

fn is_text_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::AE
            | VR::AS
            | VR::CS
            | VR::DA
            | VR::DS
            | VR::DT
            | VR::IS
            | VR::LO
            | VR::LT
            | VR::PN
            | VR::SH
            | VR::ST
            | VR::TM
            | VR::UC
            | VR::UI
            | VR::UR
            | VR::UT
    )
}

fn encode_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Text(s) => s.clone(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => format!("{:?}", f),
        Scalar::Bytes(bytes) => STANDARD.encode(bytes),
    }
}

/// Encodes a non-sequence value into its cell text.
///
/// Multiple values become a JSON array of encoded scalars. An empty value is
/// the empty string for textual VRs and the null marker otherwise. Sequences
/// and encapsulated pixel data have no cell form.
pub fn encode_value(vr: VR, value: &ElementValue) -> Result<String> {
    match value {
        ElementValue::Empty if is_text_vr(vr) => Ok(String::new()),
        ElementValue::Empty => Ok(NULL_MARKER.to_string()),
        ElementValue::Single(scalar) => Ok(encode_scalar(scalar)),
        ElementValue::Multiple(values) => {
            let encoded: Vec<String> = values.iter().map(encode_scalar).collect();
            serde_json::to_string(&encoded).map_err(|e| DeidError::Encoding(e.to_string()))
        }
        ElementValue::Sequence(_) => Err(DeidError::Encoding(format!(
            "{} sequence cannot be encoded as a single cell",
            vr.to_string()
        ))),
        ElementValue::Encapsulated { .. } => Err(DeidError::Encoding(
            "encapsulated pixel data cannot be encoded as a cell".into(),
        )),
    }
}

fn decode_scalar(vr: VR, text: &str) -> std::result::Result<Option<Scalar>, String> {
    if is_binary_vr(vr) {
        return STANDARD
            .decode(text)
            .map(|bytes| Some(Scalar::Bytes(bytes)))
            .map_err(|e| format!("invalid base64 for {}: {}", vr.to_string(), e));
    }
    if is_integer_vr(vr) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        return trimmed
            .parse::<i64>()
            .map(|i| Some(Scalar::Int(i)))
            .map_err(|_| format!("invalid integer {:?} for {}", text, vr.to_string()));
    }
    if is_float_vr(vr) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        return trimmed
            .parse::<f64>()
            .map(|f| Some(Scalar::Float(f)))
            .map_err(|_| format!("invalid float {:?} for {}", text, vr.to_string()));
    }
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(Scalar::Text(text.to_string())))
}

fn decode_list(vr: VR, text: &str) -> Decoded {
    let items: Vec<serde_json::Value> = match serde_json::from_str(text) {
        Ok(items) => items,
        Err(e) => return Decoded::Malformed(format!("invalid value list {:?}: {}", text, e)),
    };

    let mut values = Vec::with_capacity(items.len());
    for item in items {
        let text = match item {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Decoded::Malformed(format!("unexpected list item {}", other)),
        };
        match decode_scalar(vr, &text) {
            Ok(Some(scalar)) => values.push(scalar),
            Ok(None) => values.push(Scalar::Text(String::new())),
            Err(reason) => return Decoded::Malformed(reason),
        }
    }

    if values.is_empty() {
        Decoded::Present(ElementValue::Empty)
    } else {
        Decoded::Present(ElementValue::Multiple(values))
    }
}

/// Decodes cell text back into a value of the given VR and multiplicity.
///
/// [`NULL_MARKER`] is decoded as [`Decoded::Absent`] whatever the VR, text VRs
/// included.
pub fn decode_value(vr: VR, vm: u32, text: &str) -> Decoded {
    if text == NULL_MARKER {
        return Decoded::Absent;
    }
    if vr == VR::SQ {
        return Decoded::Malformed("sequence columns carry no value".into());
    }
    if vm != 1 && text.starts_with('[') {
        return decode_list(vr, text);
    }
    match decode_scalar(vr, text) {
        Ok(Some(scalar)) => Decoded::Present(ElementValue::Single(scalar)),
        Ok(None) => Decoded::Present(ElementValue::Empty),
        Err(reason) => Decoded::Malformed(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        let text = ElementValue::Single(Scalar::from("DOE^JOHN"));
        assert_eq!(encode_value(VR::PN, &text).unwrap(), "DOE^JOHN");

        let int = ElementValue::Single(Scalar::Int(512));
        assert_eq!(encode_value(VR::US, &int).unwrap(), "512");

        let float = ElementValue::Single(Scalar::Float(1.0));
        assert_eq!(encode_value(VR::FD, &float).unwrap(), "1.0");

        let bytes = ElementValue::Single(Scalar::Bytes(b"hello".to_vec()));
        assert_eq!(encode_value(VR::OB, &bytes).unwrap(), "aGVsbG8=");
    }

    #[test]
    fn test_encode_empty_values() {
        assert_eq!(encode_value(VR::LO, &ElementValue::Empty).unwrap(), "");
        assert_eq!(encode_value(VR::US, &ElementValue::Empty).unwrap(), "None");
        assert_eq!(
            encode_value(VR::CS, &ElementValue::Multiple(vec![])).unwrap(),
            "[]"
        );
    }

    #[test]
    fn test_encode_multiple() {
        let value = ElementValue::Multiple(vec![Scalar::Int(1), Scalar::Int(2)]);
        assert_eq!(encode_value(VR::US, &value).unwrap(), r#"["1","2"]"#);
    }

    #[test]
    fn test_encode_unencodable() {
        let value = ElementValue::Encapsulated {
            offset_table: vec![],
            fragments: vec![vec![0xff, 0xd8]],
        };
        assert!(matches!(
            encode_value(VR::OB, &value),
            Err(DeidError::Encoding(_))
        ));
    }

    #[test]
    fn test_decode_by_vr() {
        assert_eq!(
            decode_value(VR::US, 1, "512"),
            Decoded::Present(ElementValue::Single(Scalar::Int(512)))
        );
        assert_eq!(
            decode_value(VR::IS, 1, " 42"),
            Decoded::Present(ElementValue::Single(Scalar::Int(42)))
        );
        assert_eq!(
            decode_value(VR::FD, 1, "0.5"),
            Decoded::Present(ElementValue::Single(Scalar::Float(0.5)))
        );
        assert_eq!(
            decode_value(VR::OB, 1, "aGVsbG8="),
            Decoded::Present(ElementValue::Single(Scalar::Bytes(b"hello".to_vec())))
        );
        assert_eq!(
            decode_value(VR::DS, 1, "1.50"),
            Decoded::Present(ElementValue::Single(Scalar::from("1.50")))
        );
    }

    #[test]
    fn test_decode_null_marker_is_absent() {
        assert_eq!(decode_value(VR::LO, 1, "None"), Decoded::Absent);
        assert_eq!(decode_value(VR::US, 0, "None"), Decoded::Absent);
        // a genuine "None" text is not told apart from the marker
        assert_eq!(
            decode_value(VR::PN, 1, &encode_value(VR::PN, &ElementValue::Single(Scalar::from("None"))).unwrap()),
            Decoded::Absent
        );
        assert_eq!(
            decode_value(VR::LO, 0, ""),
            Decoded::Present(ElementValue::Empty)
        );
    }

    #[test]
    fn test_decode_lists() {
        assert_eq!(
            decode_value(VR::US, 2, r#"["1", "2"]"#),
            Decoded::Present(ElementValue::Multiple(vec![Scalar::Int(1), Scalar::Int(2)]))
        );
        assert_eq!(
            decode_value(VR::CS, 2, r#"["ORIGINAL","PRIMARY"]"#),
            Decoded::Present(ElementValue::Multiple(vec![
                Scalar::from("ORIGINAL"),
                Scalar::from("PRIMARY")
            ]))
        );
        assert_eq!(
            decode_value(VR::CS, 0, "[]"),
            Decoded::Present(ElementValue::Empty)
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode_value(VR::US, 1, "abc"), Decoded::Malformed(_)));
        assert!(matches!(decode_value(VR::OB, 1, "%%%"), Decoded::Malformed(_)));
        assert!(matches!(decode_value(VR::US, 2, "[1,"), Decoded::Malformed(_)));
        assert!(matches!(
            decode_value(VR::US, 1, "abc").into_value(),
            Err(DeidError::Decoding(_))
        ));
    }
}
