#![forbid(unsafe_code)]

//! Identifier conventions: `Signature-<guid>`, `SignatureValue-<guid>`,
//! `<Property>-<guid>`.

/// A fresh lowercase hyphenated v4 UUID.
pub fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `<name>-<guid>` with a fresh guid.
pub fn property_id(name: &str) -> String {
    format!("{name}-{}", new_guid())
}

/// The ids written into one new signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureIds {
    pub signature: String,
    pub signed_info: String,
    pub signature_value: String,
    pub key_info: String,
    pub qualifying_properties: String,
    pub signed_properties: String,
}

impl SignatureIds {
    pub fn generate() -> Self {
        Self::for_guid(&new_guid())
    }

    pub fn for_guid(guid: &str) -> Self {
        let signature = format!("Signature-{guid}");
        Self {
            signed_info: format!("SignedInfo-{signature}"),
            signature_value: format!("SignatureValue-{guid}"),
            key_info: format!("KeyInfoId-{signature}"),
            qualifying_properties: format!("QualifyingProperties-{guid}"),
            signed_properties: format!("SignedProperties-{signature}"),
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_share_guid() {
        let ids = SignatureIds::for_guid("1234");
        assert_eq!(ids.signature, "Signature-1234");
        assert_eq!(ids.signature_value, "SignatureValue-1234");
        assert_eq!(ids.signed_properties, "SignedProperties-Signature-1234");
        assert_eq!(ids.key_info, "KeyInfoId-Signature-1234");
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(SignatureIds::generate(), SignatureIds::generate());
        assert!(property_id("Reference").starts_with("Reference-"));
    }
}
