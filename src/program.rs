//! # Program Wire Format
//!
//! The byte layout shared by the encoder and the dispatcher.
//!
//! ```text
//! header (95 bytes)
//!   receiver        20
//!   min amount out  32   big-endian uint
//!   flags            1   bit0 wrap-in, bit1 unwrap-out, bit2 cyclic
//!   strategy         1   0 single, 1 sequential, 2 split, 3 cyclic
//!   token in        20   post-wrap
//!   token out       20   pre-unwrap
//!   token count      1   split/cyclic slot table size, 0 otherwise
//! body
//!   single          one hop unit, to the end of the program
//!   sequential      PLE[hop unit]
//!   split / cyclic  PLE[in index(1) | out index(1) | split(3) | hop unit]
//!
//! hop unit: executor(20) | token in(20) | token out(20) | directive(1) | params(..)
//! ```
//!
//! Decoding is strict: the declared structure must account for every byte.

use ethers::types::{Address, Bytes, U256};

use crate::errors::EncodingError;
use crate::models::HopDirective;
use crate::ple;
use crate::strategy::Strategy;
use crate::utils::{write_u24, write_u256, ByteReader, U24_MAX};

pub const HEADER_LEN: usize = 95;
pub const HOP_UNIT_MIN_LEN: usize = 61;
pub const SPLIT_PREFIX_LEN: usize = 5;

/// Bit set carried in the header's flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProgramFlags(u8);

impl ProgramFlags {
    pub const WRAP_IN: u8 = 0b001;
    pub const UNWRAP_OUT: u8 = 0b010;
    pub const CYCLIC: u8 = 0b100;
    const KNOWN: u8 = Self::WRAP_IN | Self::UNWRAP_OUT | Self::CYCLIC;

    pub fn new(wrap_in: bool, unwrap_out: bool, cyclic: bool) -> Self {
        let mut bits = 0;
        if wrap_in {
            bits |= Self::WRAP_IN;
        }
        if unwrap_out {
            bits |= Self::UNWRAP_OUT;
        }
        if cyclic {
            bits |= Self::CYCLIC;
        }
        Self(bits)
    }

    pub fn from_byte(byte: u8) -> Result<Self, EncodingError> {
        if byte & !Self::KNOWN != 0 {
            return Err(EncodingError::InvalidTag {
                field: "flags",
                value: byte,
            });
        }
        Ok(Self(byte))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn wrap_in(self) -> bool {
        self.0 & Self::WRAP_IN != 0
    }

    pub fn unwrap_out(self) -> bool {
        self.0 & Self::UNWRAP_OUT != 0
    }

    pub fn cyclic(self) -> bool {
        self.0 & Self::CYCLIC != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHeader {
    pub receiver: Address,
    pub min_amount_out: U256,
    pub flags: ProgramFlags,
    pub strategy: Strategy,
    pub token_in: Address,
    pub token_out: Address,
    pub token_count: u8,
}

/// Self-contained description of one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopUnit {
    pub executor: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub directive: HopDirective,
    /// Opaque to the dispatcher; interpreted by the addressed executor.
    pub params: Bytes,
}

impl HopUnit {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HOP_UNIT_MIN_LEN + self.params.len());
        out.extend_from_slice(self.executor.as_bytes());
        out.extend_from_slice(self.token_in.as_bytes());
        out.extend_from_slice(self.token_out.as_bytes());
        out.push(self.directive.to_byte());
        out.extend_from_slice(&self.params);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        let mut reader = ByteReader::new(bytes, "hop unit");
        let executor = reader.address()?;
        let token_in = reader.address()?;
        let token_out = reader.address()?;
        let directive = HopDirective::from_byte(reader.u8()?)?;
        let params = Bytes::from(reader.rest().to_vec());
        Ok(Self {
            executor,
            token_in,
            token_out,
            directive,
            params,
        })
    }
}

/// Hop unit of a split or cyclic program, addressed through the token slot table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitUnit {
    pub token_in_index: u8,
    pub token_out_index: u8,
    /// u24 fraction of the slot's *remaining* amount; 0 takes all of it.
    pub split: u32,
    pub hop: HopUnit,
}

impl SplitUnit {
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(SPLIT_PREFIX_LEN + HOP_UNIT_MIN_LEN + self.hop.params.len());
        out.push(self.token_in_index);
        out.push(self.token_out_index);
        write_u24(&mut out, self.split)?;
        out.extend_from_slice(&self.hop.encode());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        let mut reader = ByteReader::new(bytes, "split unit");
        let token_in_index = reader.u8()?;
        let token_out_index = reader.u8()?;
        let split = reader.u24()?;
        let hop = HopUnit::decode(reader.rest())?;
        Ok(Self {
            token_in_index,
            token_out_index,
            split,
            hop,
        })
    }
}

/// An element of a PLE sequence: either a unit or zero-length padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PleEntry<T> {
    Unit(T),
    Padding,
}

impl<T> PleEntry<T> {
    pub fn unit(&self) -> Option<&T> {
        match self {
            PleEntry::Unit(unit) => Some(unit),
            PleEntry::Padding => None,
        }
    }
}

/// Strategy-tagged body. The variant is selected by the header's strategy byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramBody {
    Single(HopUnit),
    Sequential(Vec<PleEntry<HopUnit>>),
    Split(Vec<PleEntry<SplitUnit>>),
    Cyclic(Vec<PleEntry<SplitUnit>>),
}

impl ProgramBody {
    pub fn strategy(&self) -> Strategy {
        match self {
            ProgramBody::Single(_) => Strategy::Single,
            ProgramBody::Sequential(_) => Strategy::Sequential,
            ProgramBody::Split(_) => Strategy::Split,
            ProgramBody::Cyclic(_) => Strategy::Cyclic,
        }
    }

    /// Number of real hop units, padding excluded.
    pub fn hop_count(&self) -> usize {
        match self {
            ProgramBody::Single(_) => 1,
            ProgramBody::Sequential(entries) => entries.iter().filter(|e| e.unit().is_some()).count(),
            ProgramBody::Split(entries) | ProgramBody::Cyclic(entries) => {
                entries.iter().filter(|e| e.unit().is_some()).count()
            }
        }
    }

    /// Hop units in execution order.
    pub fn hops(&self) -> Vec<&HopUnit> {
        match self {
            ProgramBody::Single(hop) => vec![hop],
            ProgramBody::Sequential(entries) => entries.iter().filter_map(PleEntry::unit).collect(),
            ProgramBody::Split(entries) | ProgramBody::Cyclic(entries) => entries
                .iter()
                .filter_map(PleEntry::unit)
                .map(|unit| &unit.hop)
                .collect(),
        }
    }
}

/// A decoded program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub header: ProgramHeader,
    pub body: ProgramBody,
}

impl Program {
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        if self.header.strategy != self.body.strategy() {
            return Err(EncodingError::invalid(
                "strategy",
                format!(
                    "header says {:?} but body is {:?}",
                    self.header.strategy,
                    self.body.strategy()
                ),
            ));
        }
        if self.header.flags.cyclic() != (self.header.strategy == Strategy::Cyclic) {
            return Err(EncodingError::IncompatibleFlags(
                "cyclic flag must be set exactly for the cyclic strategy".to_string(),
            ));
        }
        if self.header.flags.cyclic() && self.header.flags.unwrap_out() {
            return Err(EncodingError::IncompatibleFlags(
                "cyclic programs cannot pay native currency out to the receiver".to_string(),
            ));
        }

        let mut out = Vec::with_capacity(HEADER_LEN + 128);
        out.extend_from_slice(self.header.receiver.as_bytes());
        write_u256(&mut out, self.header.min_amount_out);
        out.push(self.header.flags.bits());
        out.push(self.header.strategy.tag());
        out.extend_from_slice(self.header.token_in.as_bytes());
        out.extend_from_slice(self.header.token_out.as_bytes());
        out.push(self.header.token_count);

        match &self.body {
            ProgramBody::Single(hop) => out.extend_from_slice(&hop.encode()),
            ProgramBody::Sequential(entries) => {
                for entry in entries {
                    match entry {
                        PleEntry::Unit(hop) => ple::push(&mut out, &hop.encode())?,
                        PleEntry::Padding => ple::push(&mut out, &[])?,
                    }
                }
            }
            ProgramBody::Split(entries) | ProgramBody::Cyclic(entries) => {
                for entry in entries {
                    match entry {
                        PleEntry::Unit(unit) => {
                            if unit.split > U24_MAX {
                                return Err(EncodingError::invalid("split", "exceeds u24"));
                            }
                            ple::push(&mut out, &unit.encode()?)?
                        }
                        PleEntry::Padding => ple::push(&mut out, &[])?,
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        let mut reader = ByteReader::new(bytes, "header");
        let receiver = reader.address()?;
        let min_amount_out = reader.u256()?;
        let flags = ProgramFlags::from_byte(reader.u8()?)?;
        let strategy = Strategy::from_tag(reader.u8()?)?;
        let token_in = reader.address()?;
        let token_out = reader.address()?;
        let token_count = reader.u8()?;
        let body_bytes = reader.rest();

        if flags.cyclic() != (strategy == Strategy::Cyclic) {
            return Err(EncodingError::IncompatibleFlags(
                "cyclic flag disagrees with the strategy tag".to_string(),
            ));
        }
        if flags.cyclic() && flags.unwrap_out() {
            return Err(EncodingError::IncompatibleFlags(
                "cyclic programs cannot pay native currency out to the receiver".to_string(),
            ));
        }

        let body = match strategy {
            Strategy::Single => {
                if token_count != 0 {
                    return Err(EncodingError::invalid("token count", "must be 0 for a single hop"));
                }
                ProgramBody::Single(decode_hop_unit(body_bytes)?)
            }
            Strategy::Sequential => {
                if token_count != 0 {
                    return Err(EncodingError::invalid("token count", "must be 0 for a sequence"));
                }
                let entries = ple::decode(body_bytes)?
                    .into_iter()
                    .map(|element| {
                        if element.is_empty() {
                            Ok(PleEntry::Padding)
                        } else {
                            decode_hop_unit(element).map(PleEntry::Unit)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                ProgramBody::Sequential(entries)
            }
            Strategy::Split | Strategy::Cyclic => {
                if token_count < 2 {
                    return Err(EncodingError::invalid(
                        "token count",
                        format!("split programs need at least 2 slots, got {}", token_count),
                    ));
                }
                let entries = ple::decode(body_bytes)?
                    .into_iter()
                    .map(|element| {
                        if element.is_empty() {
                            return Ok(PleEntry::Padding);
                        }
                        if element.len() < SPLIT_PREFIX_LEN + HOP_UNIT_MIN_LEN {
                            return Err(EncodingError::LengthMismatch {
                                context: "split unit",
                                declared: SPLIT_PREFIX_LEN + HOP_UNIT_MIN_LEN,
                                actual: element.len(),
                            });
                        }
                        let unit = SplitUnit::decode(element)?;
                        if unit.token_in_index >= token_count || unit.token_out_index >= token_count {
                            return Err(EncodingError::invalid(
                                "token index",
                                format!(
                                    "{}/{} outside a table of {} slots",
                                    unit.token_in_index, unit.token_out_index, token_count
                                ),
                            ));
                        }
                        Ok(PleEntry::Unit(unit))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if strategy == Strategy::Split {
                    ProgramBody::Split(entries)
                } else {
                    ProgramBody::Cyclic(entries)
                }
            }
        };

        if body.hop_count() == 0 {
            return Err(EncodingError::EmptySolution);
        }

        Ok(Self {
            header: ProgramHeader {
                receiver,
                min_amount_out,
                flags,
                strategy,
                token_in,
                token_out,
                token_count,
            },
            body,
        })
    }
}

fn decode_hop_unit(bytes: &[u8]) -> Result<HopUnit, EncodingError> {
    if bytes.len() < HOP_UNIT_MIN_LEN {
        return Err(EncodingError::LengthMismatch {
            context: "hop unit",
            declared: HOP_UNIT_MIN_LEN,
            actual: bytes.len(),
        });
    }
    HopUnit::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferDirective;

    fn hop(seed: u64) -> HopUnit {
        HopUnit {
            executor: Address::from_low_u64_be(0xe0 + seed),
            token_in: Address::from_low_u64_be(0x10 + seed),
            token_out: Address::from_low_u64_be(0x11 + seed),
            directive: HopDirective::new(TransferDirective::DirectPush),
            params: Bytes::from(vec![seed as u8; 40]),
        }
    }

    fn header(strategy: Strategy, token_count: u8) -> ProgramHeader {
        ProgramHeader {
            receiver: Address::from_low_u64_be(0xbeef),
            min_amount_out: U256::from(990u64),
            flags: ProgramFlags::new(false, false, strategy == Strategy::Cyclic),
            strategy,
            token_in: Address::from_low_u64_be(0x10),
            token_out: Address::from_low_u64_be(0x11),
            token_count,
        }
    }

    #[test]
    fn test_header_is_95_bytes() {
        let program = Program {
            header: header(Strategy::Single, 0),
            body: ProgramBody::Single(hop(0)),
        };
        let bytes = program.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + HOP_UNIT_MIN_LEN + 40);
        assert_eq!(&bytes[0..20], Address::from_low_u64_be(0xbeef).as_bytes());
        assert_eq!(bytes[53], Strategy::Single.tag());
        assert_eq!(Program::decode(&bytes).unwrap(), program);
    }

    #[test]
    fn test_sequential_keeps_padding() {
        let program = Program {
            header: header(Strategy::Sequential, 0),
            body: ProgramBody::Sequential(vec![
                PleEntry::Padding,
                PleEntry::Unit(hop(1)),
                PleEntry::Padding,
                PleEntry::Unit(hop(2)),
            ]),
        };
        let decoded = Program::decode(&program.encode().unwrap()).unwrap();
        assert_eq!(decoded, program);
        assert_eq!(decoded.body.hop_count(), 2);
    }

    #[test]
    fn test_trailing_byte_is_length_mismatch() {
        let program = Program {
            header: header(Strategy::Sequential, 0),
            body: ProgramBody::Sequential(vec![PleEntry::Unit(hop(1))]),
        };
        let mut bytes = program.encode().unwrap();
        bytes.push(0xff);
        assert!(matches!(
            Program::decode(&bytes),
            Err(EncodingError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let err = Program::decode(&[0u8; 60]).unwrap_err();
        assert!(matches!(err, EncodingError::LengthMismatch { context: "header", .. }));
    }

    #[test]
    fn test_split_index_outside_table() {
        let program = Program {
            header: header(Strategy::Split, 2),
            body: ProgramBody::Split(vec![PleEntry::Unit(SplitUnit {
                token_in_index: 0,
                token_out_index: 2,
                split: 0,
                hop: hop(1),
            })]),
        };
        let bytes = program.encode().unwrap();
        assert!(matches!(
            Program::decode(&bytes),
            Err(EncodingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_cyclic_unwrap_rejected() {
        let mut h = header(Strategy::Cyclic, 3);
        h.flags = ProgramFlags::new(false, true, true);
        let program = Program {
            header: h,
            body: ProgramBody::Cyclic(vec![PleEntry::Unit(SplitUnit {
                token_in_index: 0,
                token_out_index: 2,
                split: 0,
                hop: hop(1),
            })]),
        };
        assert!(matches!(
            program.encode(),
            Err(EncodingError::IncompatibleFlags(_))
        ));
    }

    #[test]
    fn test_only_padding_is_empty() {
        let program = Program {
            header: header(Strategy::Sequential, 0),
            body: ProgramBody::Sequential(vec![PleEntry::Padding, PleEntry::Padding]),
        };
        let bytes = program.encode().unwrap();
        assert_eq!(Program::decode(&bytes), Err(EncodingError::EmptySolution));
    }
}
