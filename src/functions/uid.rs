use super::common::truncate_to;
use super::errors::PseudonymizeError;
use super::pseudonymize::Pseudonymize;
use crate::config::OrgRoot;
use crate::hashing::Hasher;

const UID_HASH_DIGITS: usize = 30;

/// Derives a UID from the hash of a patient identifier and the original UID.
///
/// The same `(patient_id, uid, org_root)` always gives the same UID, so that
/// attributes referencing one original UID keep referencing one pseudonym.
pub(crate) struct UidPseudonymizer<'a, H>
where
    H: Hasher,
{
    hasher: &'a H,
    org_root: &'a OrgRoot,
    patient_id: &'a str,
}

impl<'a, H> UidPseudonymizer<'a, H>
where
    H: Hasher,
{
    pub(crate) fn new(hasher: &'a H, org_root: &'a OrgRoot, patient_id: &'a str) -> Self {
        Self {
            hasher,
            org_root,
            patient_id,
        }
    }
}

impl<H> Pseudonymize for UidPseudonymizer<'_, H>
where
    H: Hasher,
{
    fn pseudonymize(&self, uid: &str) -> Result<String, PseudonymizeError> {
        let input = format!("{}{}", self.patient_id, uid.replace('.', ""));
        let hash = self.hasher.hash(&input)?;
        Ok(format!(
            "{}{}",
            self.org_root.as_prefix(),
            truncate_to(UID_HASH_DIGITS, &hash)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{Result as HashResult, Sha256Hasher};
    use std::collections::HashSet;

    struct FakeHasher;

    impl Hasher for FakeHasher {
        fn hex_digest(&self, _input: &str) -> String {
            "0".into()
        }

        fn hash(&self, input: &str) -> HashResult<String> {
            Ok(format!("{}{}", input, "0".repeat(40)))
        }
    }

    #[test]
    fn test_known_uid() {
        let hasher = Sha256Hasher::new();
        let org_root = OrgRoot::default();
        let pseudonymizer = UidPseudonymizer::new(&hasher, &org_root, "");
        assert_eq!(
            pseudonymizer.pseudonymize("1.2.3").unwrap(),
            "9999.752635187075981849879163780219"
        );
    }

    #[test]
    fn test_patient_id_and_dots() {
        let hasher = FakeHasher;
        let org_root = "1.2".parse().unwrap();
        let pseudonymizer = UidPseudonymizer::new(&hasher, &org_root, "P1");
        let result = pseudonymizer.pseudonymize("1.2.3").unwrap();
        assert_eq!(result, "1.2.P11230000000000000000000000000");
    }

    #[test]
    fn test_deterministic() {
        let hasher = Sha256Hasher::new();
        let org_root = OrgRoot::default();
        let pseudonymizer = UidPseudonymizer::new(&hasher, &org_root, "");
        let uid = "1.3.6.1.4.1.14519.5.2.1.2135.6389.799402065306178004127703292730";
        assert_eq!(
            pseudonymizer.pseudonymize(uid).unwrap(),
            pseudonymizer.pseudonymize(uid).unwrap()
        );
    }

    #[test]
    fn test_no_collisions() {
        let hasher = Sha256Hasher::new();
        let org_root = OrgRoot::default();
        let pseudonymizer = UidPseudonymizer::new(&hasher, &org_root, "");
        let uids: HashSet<String> = (0..10_000)
            .map(|i| pseudonymizer.pseudonymize(&format!("1.2.840.{i}")).unwrap())
            .collect();
        assert_eq!(uids.len(), 10_000);
    }
}
