//! Core wire constants and the RFC 5610 type vocabulary shared by the
//! model, template, and transcoding layers.

use serde::Serialize;

/// On-wire field length marking a variable-length information element.
pub const VARLEN: u16 = 0xFFFF;

/// Private enterprise number under which reverse companions of PEN-0
/// elements are registered (RFC 5103 biflow export).
pub const PEN_REVERSE: u32 = 29305;

/// Element-id bit marking the reverse companion of a PEN-specific element.
pub const REVERSE_ID_BIT: u16 = 0x8000;

/// High bit of the on-wire element id: an enterprise number follows.
pub const ENTERPRISE_BIT: u16 = 0x8000;

/// IPFIX message version field value.
pub const IPFIX_VERSION: u16 = 0x000A;

/// Set id of a template set.
pub const TEMPLATE_SET_ID: u16 = 2;
/// Set id of an options template set.
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
/// Smallest legal data-set id (and template id). 4-255 are reserved.
pub const MIN_DATA_SET_ID: u16 = 256;

/// Message header length in octets.
pub const MSG_HEADER_LEN: usize = 16;
/// Set header length in octets.
pub const SET_HEADER_LEN: usize = 4;
/// Maximum IPFIX message length (u16 length field).
pub const MAX_MESSAGE_LEN: usize = 65535;

/// Maximum number of fields in one template: the largest message minus the
/// message and set headers, divided by the 4-octet field specifier.
pub const MAX_TEMPLATE_FIELDS: usize = (65535 - 24) / 4;

/// IANA identity of the paddingOctets element.
pub const PADDING_IDENT: (u32, u16) = (0, 210);

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
pub const NTP_EPOCH_TO_UNIX: u32 = 0x83AA_7E80;

/// Abstract data type of an information element, per the RFC 5610
/// informationElementDataType registry (with the RFC 6313 list types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum DataType {
    OctetArray = 0,
    Unsigned8 = 1,
    Unsigned16 = 2,
    Unsigned32 = 3,
    Unsigned64 = 4,
    Signed8 = 5,
    Signed16 = 6,
    Signed32 = 7,
    Signed64 = 8,
    Float32 = 9,
    Float64 = 10,
    Boolean = 11,
    MacAddress = 12,
    String = 13,
    DateTimeSeconds = 14,
    DateTimeMilliseconds = 15,
    DateTimeMicroseconds = 16,
    DateTimeNanoseconds = 17,
    Ipv4Address = 18,
    Ipv6Address = 19,
    BasicList = 20,
    SubTemplateList = 21,
    SubTemplateMultiList = 22,
}

impl DataType {
    /// Decodes a registry code, e.g. from an RFC 5610 option record.
    pub fn from_code(code: u8) -> Option<Self> {
        use DataType::*;
        Some(match code {
            0 => OctetArray,
            1 => Unsigned8,
            2 => Unsigned16,
            3 => Unsigned32,
            4 => Unsigned64,
            5 => Signed8,
            6 => Signed16,
            7 => Signed32,
            8 => Signed64,
            9 => Float32,
            10 => Float64,
            11 => Boolean,
            12 => MacAddress,
            13 => String,
            14 => DateTimeSeconds,
            15 => DateTimeMilliseconds,
            16 => DateTimeMicroseconds,
            17 => DateTimeNanoseconds,
            18 => Ipv4Address,
            19 => Ipv6Address,
            20 => BasicList,
            21 => SubTemplateList,
            22 => SubTemplateMultiList,
            _ => return None,
        })
    }

    /// Registry code of this type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Default on-wire length in octets; [`VARLEN`] for variable-length and
    /// list types.
    pub fn default_len(self) -> u16 {
        use DataType::*;
        match self {
            OctetArray | String | BasicList | SubTemplateList | SubTemplateMultiList => VARLEN,
            Unsigned8 | Signed8 | Boolean => 1,
            Unsigned16 | Signed16 => 2,
            Unsigned32 | Signed32 | Float32 | DateTimeSeconds | Ipv4Address => 4,
            Unsigned64 | Signed64 | Float64 | DateTimeMilliseconds | DateTimeMicroseconds
            | DateTimeNanoseconds => 8,
            MacAddress => 6,
            Ipv6Address => 16,
        }
    }

    /// True for the unsigned and signed integer types that permit
    /// reduced-length encoding.
    pub fn is_integer(self) -> bool {
        use DataType::*;
        matches!(
            self,
            Unsigned16 | Unsigned32 | Unsigned64 | Signed16 | Signed32 | Signed64
        )
    }

    /// True for the signed integer types.
    pub fn is_signed(self) -> bool {
        use DataType::*;
        matches!(self, Signed8 | Signed16 | Signed32 | Signed64)
    }

    /// True for the three RFC 6313 structured-data types.
    pub fn is_list(self) -> bool {
        use DataType::*;
        matches!(self, BasicList | SubTemplateList | SubTemplateMultiList)
    }

    /// True for string and octetArray, the types that may be encoded at any
    /// length including [`VARLEN`].
    pub fn is_octet_like(self) -> bool {
        matches!(self, DataType::OctetArray | DataType::String)
    }
}

/// Data semantics of an information element, per the RFC 5610
/// informationElementSemantics registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum Semantics {
    #[default]
    Default = 0,
    Quantity = 1,
    TotalCounter = 2,
    DeltaCounter = 3,
    Identifier = 4,
    Flags = 5,
    List = 6,
    SnmpCounter = 7,
    SnmpGauge = 8,
}

impl Semantics {
    pub fn from_code(code: u8) -> Option<Self> {
        use Semantics::*;
        Some(match code {
            0 => Default,
            1 => Quantity,
            2 => TotalCounter,
            3 => DeltaCounter,
            4 => Identifier,
            5 => Flags,
            6 => List,
            7 => SnmpCounter,
            8 => SnmpGauge,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Measurement units of an information element, per the RFC 5610
/// informationElementUnits registry. Codes outside the registry are kept
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Units {
    #[default]
    None,
    Bits,
    Octets,
    Packets,
    Flows,
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
    Words4Octets,
    Messages,
    Hops,
    Entries,
    Frames,
    Ports,
    Inferred,
    Other(u16),
}

impl Units {
    pub fn from_code(code: u16) -> Self {
        use Units::*;
        match code {
            0 => None,
            1 => Bits,
            2 => Octets,
            3 => Packets,
            4 => Flows,
            5 => Seconds,
            6 => Milliseconds,
            7 => Microseconds,
            8 => Nanoseconds,
            9 => Words4Octets,
            10 => Messages,
            11 => Hops,
            12 => Entries,
            13 => Frames,
            14 => Ports,
            15 => Inferred,
            other => Other(other),
        }
    }

    pub fn code(self) -> u16 {
        use Units::*;
        match self {
            None => 0,
            Bits => 1,
            Octets => 2,
            Packets => 3,
            Flows => 4,
            Seconds => 5,
            Milliseconds => 6,
            Microseconds => 7,
            Nanoseconds => 8,
            Words4Octets => 9,
            Messages => 10,
            Hops => 11,
            Entries => 12,
            Frames => 13,
            Ports => 14,
            Inferred => 15,
            Other(code) => code,
        }
    }
}

/// RFC 6313 structured-data semantic octet values.
pub mod list_semantics {
    pub const NONE_OF: u8 = 0;
    pub const EXACTLY_ONE_OF: u8 = 1;
    pub const ONE_OR_MORE_OF: u8 = 2;
    pub const ALL_OF: u8 = 3;
    pub const ORDERED: u8 = 4;
    pub const UNDEFINED: u8 = 0xFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_codes_round_trip() {
        for code in 0..=22u8 {
            let dt = DataType::from_code(code).unwrap();
            assert_eq!(dt.code(), code);
        }
        assert!(DataType::from_code(23).is_none());
    }

    #[test]
    fn default_lengths() {
        assert_eq!(DataType::Unsigned64.default_len(), 8);
        assert_eq!(DataType::Ipv6Address.default_len(), 16);
        assert_eq!(DataType::MacAddress.default_len(), 6);
        assert_eq!(DataType::String.default_len(), VARLEN);
        assert_eq!(DataType::BasicList.default_len(), VARLEN);
    }

    #[test]
    fn units_other_is_preserved() {
        assert_eq!(Units::from_code(42), Units::Other(42));
        assert_eq!(Units::Other(42).code(), 42);
        assert_eq!(Units::from_code(8), Units::Nanoseconds);
    }
}
