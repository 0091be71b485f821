use thiserror::Error;

use crate::core::avp::{AVPType, AVP};

pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 253;

#[derive(Error, Debug, PartialEq)]
pub enum AttributeError {
    /// A length byte is below 2 or would read past the end of the buffer.
    #[error("malformed attribute at offset {0}: {1}")]
    MalformedAttribute(usize, String),

    /// A value exceeds what a single length byte can describe.
    #[error("attribute type {0} is too large: {1} bytes (max {max})", max = MAX_ATTRIBUTE_VALUE_LENGTH)]
    AttributeTooLarge(AVPType, usize),
}

/// Ordered sequence of the attributes of a packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes(pub(crate) Vec<AVP>);

impl Attributes {
    pub fn decode(bs: &[u8]) -> Result<Attributes, AttributeError> {
        let mut i = 0;
        let mut attrs = Vec::new();

        while bs.len() > i {
            if bs[i..].len() < 2 {
                return Err(AttributeError::MalformedAttribute(
                    i,
                    "short buffer".to_owned(),
                ));
            }

            let length = bs[i + 1] as usize;
            if length > bs[i..].len() || length < 2 {
                return Err(AttributeError::MalformedAttribute(
                    i,
                    format!("invalid attribute length {}", length),
                ));
            }

            attrs.push(AVP {
                typ: bs[i],
                value: bs[i + 2..i + length].to_vec(),
            });

            i += length;
        }

        Ok(Attributes(attrs))
    }

    pub fn encode(&self) -> Result<Vec<u8>, AttributeError> {
        let mut encoded: Vec<u8> = Vec::new();

        for avp in &self.0 {
            let attr_len = avp.value.len();
            if attr_len > MAX_ATTRIBUTE_VALUE_LENGTH {
                return Err(AttributeError::AttributeTooLarge(avp.typ, attr_len));
            }
            encoded.push(avp.typ);
            encoded.push(2 + attr_len as u8);
            encoded.extend(&avp.value);
        }

        Ok(encoded)
    }

    pub(crate) fn add(&mut self, avp: AVP) {
        self.0.push(avp)
    }

    pub(crate) fn extend(&mut self, avps: Vec<AVP>) {
        self.0.extend(avps)
    }

    pub(crate) fn del(&mut self, typ: AVPType) {
        self.0.retain(|avp| avp.typ != typ);
    }

    pub(crate) fn lookup(&self, typ: AVPType) -> Option<&AVP> {
        self.0.iter().find(|avp| avp.typ == typ)
    }

    pub(crate) fn lookup_all(&self, typ: AVPType) -> Vec<&AVP> {
        self.0.iter().filter(|&avp| avp.typ == typ).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AVP> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::attributes::{AttributeError, Attributes};
    use crate::core::avp::AVP;

    #[test]
    fn it_should_reproduce_input_bytes() -> Result<(), AttributeError> {
        let bs = vec![
            0x01, 0x06, 0x6e, 0x65, 0x6d, 0x6f, 0x18, 0x02, 0x05, 0x06, 0x00, 0x00, 0x00, 0x03,
        ];
        let attrs = Attributes::decode(&bs)?;
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs.lookup(24), Some(&AVP::from_bytes(24, &[])));
        assert_eq!(attrs.encode()?, bs);
        Ok(())
    }

    #[test]
    fn it_should_reject_malformed_lengths() {
        struct TestCase {
            bs: Vec<u8>,
            expected: AttributeError,
        }

        let test_cases = vec![
            TestCase {
                bs: vec![0x01],
                expected: AttributeError::MalformedAttribute(0, "short buffer".to_owned()),
            },
            TestCase {
                bs: vec![0x01, 0x01, 0x00],
                expected: AttributeError::MalformedAttribute(
                    0,
                    "invalid attribute length 1".to_owned(),
                ),
            },
            TestCase {
                bs: vec![0x01, 0x03, 0x61, 0x02, 0x09, 0x00],
                expected: AttributeError::MalformedAttribute(
                    3,
                    "invalid attribute length 9".to_owned(),
                ),
            },
        ];

        for test_case in test_cases {
            assert_eq!(Attributes::decode(&test_case.bs), Err(test_case.expected));
        }
    }

    #[test]
    fn it_should_refuse_to_encode_oversized_value() {
        let attrs = Attributes(vec![AVP::from_bytes(79, &[0; 254])]);
        assert_eq!(attrs.encode(), Err(AttributeError::AttributeTooLarge(79, 254)));

        let attrs = Attributes(vec![AVP::from_bytes(79, &[0; 253])]);
        assert!(attrs.encode().is_ok());
    }
}
