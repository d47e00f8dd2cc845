#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XAdES 1.3.2 namespace (ETSI TS 101 903 v1.3.2)
pub const XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// XAdES 1.4.1 namespace, home of `ArchiveTimeStamp`
pub const XADES141: &str = "http://uri.etsi.org/01903/v1.4.1#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// Default prefix for XML-DSig elements written by the engine.
pub const DEFAULT_DSIG_PREFIX: &str = "ds";

/// Default prefix for XAdES elements written by the engine.
pub const DEFAULT_XADES_PREFIX: &str = "xades";

/// Default prefix for XAdES 1.4.1 elements.
pub const DEFAULT_XADES141_PREFIX: &str = "xades141";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const OBJECT: &str = "Object";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const XPATH: &str = "XPath";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // XAdES container elements
    pub const QUALIFYING_PROPERTIES: &str = "QualifyingProperties";
    pub const SIGNED_PROPERTIES: &str = "SignedProperties";
    pub const SIGNED_SIGNATURE_PROPERTIES: &str = "SignedSignatureProperties";
    pub const SIGNED_DATA_OBJECT_PROPERTIES: &str = "SignedDataObjectProperties";
    pub const UNSIGNED_PROPERTIES: &str = "UnsignedProperties";
    pub const UNSIGNED_SIGNATURE_PROPERTIES: &str = "UnsignedSignatureProperties";

    // Signed signature properties
    pub const SIGNING_TIME: &str = "SigningTime";
    pub const SIGNING_CERTIFICATE: &str = "SigningCertificate";
    pub const SIGNING_CERTIFICATE_V2: &str = "SigningCertificateV2";
    pub const CERT: &str = "Cert";
    pub const CERT_DIGEST: &str = "CertDigest";
    pub const ISSUER_SERIAL: &str = "IssuerSerial";
    pub const ISSUER_SERIAL_V2: &str = "IssuerSerialV2";
    pub const SIGNATURE_POLICY_IDENTIFIER: &str = "SignaturePolicyIdentifier";
    pub const SIGNATURE_POLICY_ID: &str = "SignaturePolicyId";
    pub const SIGNATURE_POLICY_IMPLIED: &str = "SignaturePolicyImplied";
    pub const SIG_POLICY_ID: &str = "SigPolicyId";
    pub const SIG_POLICY_HASH: &str = "SigPolicyHash";
    pub const IDENTIFIER: &str = "Identifier";
    pub const DESCRIPTION: &str = "Description";
    pub const SIGNATURE_PRODUCTION_PLACE: &str = "SignatureProductionPlace";
    pub const CITY: &str = "City";
    pub const STATE_OR_PROVINCE: &str = "StateOrProvince";
    pub const POSTAL_CODE: &str = "PostalCode";
    pub const COUNTRY_NAME: &str = "CountryName";
    pub const SIGNER_ROLE: &str = "SignerRole";
    pub const CLAIMED_ROLES: &str = "ClaimedRoles";
    pub const CLAIMED_ROLE: &str = "ClaimedRole";
    pub const CERTIFIED_ROLES: &str = "CertifiedRoles";
    pub const CERTIFIED_ROLE: &str = "CertifiedRole";

    // Signed data object properties
    pub const DATA_OBJECT_FORMAT: &str = "DataObjectFormat";
    pub const MIME_TYPE: &str = "MimeType";
    pub const ENCODING: &str = "Encoding";
    pub const COMMITMENT_TYPE_INDICATION: &str = "CommitmentTypeIndication";
    pub const COMMITMENT_TYPE_ID: &str = "CommitmentTypeId";
    pub const OBJECT_REFERENCE: &str = "ObjectReference";
    pub const ALL_SIGNED_DATA_OBJECTS: &str = "AllSignedDataObjects";
    pub const ALL_DATA_OBJECTS_TIME_STAMP: &str = "AllDataObjectsTimeStamp";
    pub const INDIVIDUAL_DATA_OBJECTS_TIME_STAMP: &str = "IndividualDataObjectsTimeStamp";

    // Unsigned signature properties
    pub const COUNTER_SIGNATURE: &str = "CounterSignature";
    pub const SIGNATURE_TIME_STAMP: &str = "SignatureTimeStamp";
    pub const COMPLETE_CERTIFICATE_REFS: &str = "CompleteCertificateRefs";
    pub const COMPLETE_REVOCATION_REFS: &str = "CompleteRevocationRefs";
    pub const CERT_REFS: &str = "CertRefs";
    pub const CRL_REFS: &str = "CRLRefs";
    pub const CRL_REF: &str = "CRLRef";
    pub const DIGEST_ALG_AND_VALUE: &str = "DigestAlgAndValue";
    pub const CRL_IDENTIFIER: &str = "CRLIdentifier";
    pub const ISSUER: &str = "Issuer";
    pub const ISSUE_TIME: &str = "IssueTime";
    pub const NUMBER: &str = "Number";
    pub const OCSP_REFS: &str = "OCSPRefs";
    pub const OCSP_REF: &str = "OCSPRef";
    pub const OCSP_IDENTIFIER: &str = "OCSPIdentifier";
    pub const RESPONDER_ID: &str = "ResponderID";
    pub const BY_NAME: &str = "ByName";
    pub const PRODUCED_AT: &str = "ProducedAt";
    pub const SIG_AND_REFS_TIME_STAMP: &str = "SigAndRefsTimeStamp";
    pub const REFS_ONLY_TIME_STAMP: &str = "RefsOnlyTimeStamp";
    pub const CERTIFICATE_VALUES: &str = "CertificateValues";
    pub const ENCAPSULATED_X509_CERTIFICATE: &str = "EncapsulatedX509Certificate";
    pub const REVOCATION_VALUES: &str = "RevocationValues";
    pub const CRL_VALUES: &str = "CRLValues";
    pub const ENCAPSULATED_CRL_VALUE: &str = "EncapsulatedCRLValue";
    pub const OCSP_VALUES: &str = "OCSPValues";
    pub const ENCAPSULATED_OCSP_VALUE: &str = "EncapsulatedOCSPValue";
    pub const ARCHIVE_TIME_STAMP: &str = "ArchiveTimeStamp";

    // Timestamp container children
    pub const INCLUDE: &str = "Include";
    pub const ENCAPSULATED_TIME_STAMP: &str = "EncapsulatedTimeStamp";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const MIME_TYPE: &str = "MimeType";
    pub const ENCODING: &str = "Encoding";
    pub const ALGORITHM: &str = "Algorithm";
    pub const TARGET: &str = "Target";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const OBJECT_REFERENCE: &str = "ObjectReference";
    pub const REFERENCED_DATA: &str = "referencedData";
}
