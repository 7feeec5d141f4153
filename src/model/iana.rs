//! Compiled-in subset of the IANA IPFIX information element registry, plus
//! the CERT private elements used for template metadata records.

use super::InfoElement;
use crate::types::{DataType, Semantics, Units};

/// Enterprise number of the CERT NetSA registry (template metadata
/// elements).
pub const CERT_PEN: u32 = 6871;

/// CERT element ids used by template-metadata option records.
pub mod cert {
    pub const TEMPLATE_NAME: u16 = 1000;
    pub const TEMPLATE_DESCRIPTION: u16 = 1001;
    pub const APPLICATION_LABEL: u16 = 1002;
    pub const PARENT_TEMPLATE_ID: u16 = 1003;
}

/// IANA element ids referenced directly by the codec internals.
pub mod ids {
    pub const PADDING_OCTETS: u16 = 210;
    pub const TEMPLATE_ID: u16 = 145;
    pub const BASIC_LIST: u16 = 291;
    pub const SUB_TEMPLATE_LIST: u16 = 292;
    pub const SUB_TEMPLATE_MULTI_LIST: u16 = 293;
    pub const INFORMATION_ELEMENT_ID: u16 = 303;
    pub const INFORMATION_ELEMENT_DATA_TYPE: u16 = 339;
    pub const INFORMATION_ELEMENT_DESCRIPTION: u16 = 340;
    pub const INFORMATION_ELEMENT_NAME: u16 = 341;
    pub const INFORMATION_ELEMENT_RANGE_BEGIN: u16 = 342;
    pub const INFORMATION_ELEMENT_RANGE_END: u16 = 343;
    pub const INFORMATION_ELEMENT_SEMANTICS: u16 = 344;
    pub const INFORMATION_ELEMENT_UNITS: u16 = 345;
    pub const PRIVATE_ENTERPRISE_NUMBER: u16 = 346;
}

/// The seed table. Flow-record elements that participate in biflow export
/// are marked reversible; inserting them also registers their reverse
/// companions.
pub(crate) fn elements() -> Vec<InfoElement> {
    use DataType::*;
    use Semantics::*;
    use ids::*;

    let ie = InfoElement::new;
    vec![
        ie("octetDeltaCount", 0, 1, Unsigned64)
            .with_semantics(DeltaCounter)
            .with_units(Units::Octets)
            .reversible(),
        ie("packetDeltaCount", 0, 2, Unsigned64)
            .with_semantics(DeltaCounter)
            .with_units(Units::Packets)
            .reversible(),
        ie("protocolIdentifier", 0, 4, Unsigned8).with_semantics(Identifier),
        ie("ipClassOfService", 0, 5, Unsigned8).reversible(),
        ie("tcpControlBits", 0, 6, Unsigned16)
            .with_semantics(Flags)
            .reversible(),
        ie("sourceTransportPort", 0, 7, Unsigned16).with_semantics(Identifier),
        ie("sourceIPv4Address", 0, 8, Ipv4Address),
        ie("ingressInterface", 0, 10, Unsigned32).with_semantics(Identifier),
        ie("destinationTransportPort", 0, 11, Unsigned16).with_semantics(Identifier),
        ie("destinationIPv4Address", 0, 12, Ipv4Address),
        ie("egressInterface", 0, 14, Unsigned32).with_semantics(Identifier),
        ie("sourceIPv6Address", 0, 27, Ipv6Address),
        ie("destinationIPv6Address", 0, 28, Ipv6Address),
        ie("icmpTypeCodeIPv4", 0, 32, Unsigned16).with_semantics(Identifier),
        ie("sourceMacAddress", 0, 56, MacAddress),
        ie("vlanId", 0, 58, Unsigned16).with_semantics(Identifier),
        ie("destinationMacAddress", 0, 80, MacAddress),
        ie("octetTotalCount", 0, 85, Unsigned64)
            .with_semantics(TotalCounter)
            .with_units(Units::Octets)
            .reversible(),
        ie("packetTotalCount", 0, 86, Unsigned64)
            .with_semantics(TotalCounter)
            .with_units(Units::Packets)
            .reversible(),
        ie("applicationDescription", 0, 94, String),
        ie("applicationId", 0, 95, OctetArray).with_semantics(Identifier),
        ie("applicationName", 0, 96, String),
        ie("flowEndReason", 0, 136, Unsigned8).with_semantics(Identifier),
        ie("templateId", 0, TEMPLATE_ID, Unsigned16).with_semantics(Identifier),
        ie("observationDomainId", 0, 149, Unsigned32).with_semantics(Identifier),
        ie("flowStartSeconds", 0, 150, DateTimeSeconds).with_units(Units::Seconds),
        ie("flowEndSeconds", 0, 151, DateTimeSeconds).with_units(Units::Seconds),
        ie("flowStartMilliseconds", 0, 152, DateTimeMilliseconds)
            .with_units(Units::Milliseconds),
        ie("flowEndMilliseconds", 0, 153, DateTimeMilliseconds).with_units(Units::Milliseconds),
        ie("flowStartMicroseconds", 0, 154, DateTimeMicroseconds)
            .with_units(Units::Microseconds),
        ie("flowEndMicroseconds", 0, 155, DateTimeMicroseconds).with_units(Units::Microseconds),
        ie("flowStartNanoseconds", 0, 156, DateTimeNanoseconds).with_units(Units::Nanoseconds),
        ie("flowEndNanoseconds", 0, 157, DateTimeNanoseconds).with_units(Units::Nanoseconds),
        ie("flowId", 0, 148, Unsigned64).with_semantics(Identifier),
        ie("paddingOctets", 0, PADDING_OCTETS, OctetArray),
        ie("dataRecordsReliability", 0, 276, Boolean),
        ie("basicList", 0, BASIC_LIST, BasicList).with_semantics(List),
        ie("subTemplateList", 0, SUB_TEMPLATE_LIST, SubTemplateList).with_semantics(List),
        ie(
            "subTemplateMultiList",
            0,
            SUB_TEMPLATE_MULTI_LIST,
            SubTemplateMultiList,
        )
        .with_semantics(List),
        ie("informationElementId", 0, INFORMATION_ELEMENT_ID, Unsigned16)
            .with_semantics(Identifier),
        ie("absoluteError", 0, 320, Float64),
        ie("relativeError", 0, 321, Float64),
        ie(
            "informationElementDataType",
            0,
            INFORMATION_ELEMENT_DATA_TYPE,
            Unsigned8,
        )
        .with_semantics(Identifier),
        ie(
            "informationElementDescription",
            0,
            INFORMATION_ELEMENT_DESCRIPTION,
            String,
        ),
        ie(
            "informationElementName",
            0,
            INFORMATION_ELEMENT_NAME,
            String,
        ),
        ie(
            "informationElementRangeBegin",
            0,
            INFORMATION_ELEMENT_RANGE_BEGIN,
            Unsigned64,
        ),
        ie(
            "informationElementRangeEnd",
            0,
            INFORMATION_ELEMENT_RANGE_END,
            Unsigned64,
        ),
        ie(
            "informationElementSemantics",
            0,
            INFORMATION_ELEMENT_SEMANTICS,
            Unsigned8,
        )
        .with_semantics(Identifier),
        ie(
            "informationElementUnits",
            0,
            INFORMATION_ELEMENT_UNITS,
            Unsigned16,
        )
        .with_semantics(Identifier),
        ie(
            "privateEnterpriseNumber",
            0,
            PRIVATE_ENTERPRISE_NUMBER,
            Unsigned32,
        )
        .with_semantics(Identifier),
        // CERT template-metadata elements
        ie("templateName", CERT_PEN, cert::TEMPLATE_NAME, String),
        ie(
            "templateDescription",
            CERT_PEN,
            cert::TEMPLATE_DESCRIPTION,
            String,
        ),
        ie(
            "applicationLabel",
            CERT_PEN,
            cert::APPLICATION_LABEL,
            Unsigned16,
        )
        .with_semantics(Identifier),
        ie(
            "parentTemplateId",
            CERT_PEN,
            cert::PARENT_TEMPLATE_ID,
            Unsigned16,
        )
        .with_semantics(Identifier),
    ]
}
