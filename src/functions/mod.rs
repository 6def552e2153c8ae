//! Value-representation directed pseudonymization.

pub(crate) mod common;
pub(crate) mod date;
pub mod errors;
pub(crate) mod identifier;
pub(crate) mod pseudonymize;
pub(crate) mod random;
pub(crate) mod uid;

pub use errors::PseudonymizeError;

use crate::config::OrgRoot;
use crate::hashing::Hasher;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use date::{FirstDayOfYear, FixedTimestamp, HiddenTime};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use identifier::{IdentifierEncoding, IdentifierPseudonymizer};
use pseudonymize::Pseudonymize;
use random::{PatientNamePseudonymizer, RandomStringPseudonymizer};
use uid::UidPseudonymizer;

const SH_PSEUDONYM_LENGTH: usize = 16;
const LO_PSEUDONYM_LENGTH: usize = 64;

const FRAME_ORIGIN_TIMESTAMP: Tag = Tag(0x0034, 0x0007);
const FLOW_IDENTIFIER: Tag = Tag(0x0034, 0x0002);
const SOURCE_IDENTIFIER: Tag = Tag(0x0034, 0x0005);
const X_RAY_SOURCE_ID: Tag = Tag(0x0018, 0x9367);

/// Pseudonymizes the cell `value` of an attribute of type `vr` found at `tag_path`.
///
/// UIDs are derived deterministically from the original UID and `org_root`.
/// Returns `None` when no pseudonym is defined for this VR, in which case the
/// value has to be removed.
pub fn pseudonymize<H: Hasher>(
    hasher: &H,
    tag_path: &[Tag],
    vr: VR,
    value: &str,
    org_root: &OrgRoot,
) -> Result<Option<String>, PseudonymizeError> {
    let on_path = |candidates: &[Tag]| tag_path.iter().any(|tag| candidates.contains(tag));

    let pseudonym = match vr {
        VR::DA | VR::DT => FirstDayOfYear.pseudonymize(value)?,
        VR::TM => HiddenTime.pseudonymize(value)?,
        _ if vr == VR::PN || on_path(&[tags::PATIENT_ID]) => {
            PatientNamePseudonymizer.pseudonymize(value)?
        }
        VR::OB if on_path(&[FRAME_ORIGIN_TIMESTAMP]) => {
            STANDARD.encode(FixedTimestamp.pseudonymize(value)?)
        }
        VR::SH => RandomStringPseudonymizer::new(SH_PSEUDONYM_LENGTH).pseudonymize(value)?,
        VR::LO => RandomStringPseudonymizer::new(LO_PSEUDONYM_LENGTH).pseudonymize(value)?,
        VR::UI => UidPseudonymizer::new(hasher, org_root, "").pseudonymize(value)?,
        VR::OB if on_path(&[SOURCE_IDENTIFIER, FLOW_IDENTIFIER]) => {
            IdentifierPseudonymizer::new(hasher, IdentifierEncoding::Base64).pseudonymize(value)?
        }
        VR::UC if on_path(&[X_RAY_SOURCE_ID]) => {
            IdentifierPseudonymizer::new(hasher, IdentifierEncoding::Hex).pseudonymize(value)?
        }
        _ => return Ok(None),
    };
    Ok(Some(pseudonym))
}
