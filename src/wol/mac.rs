use crate::wol::Error;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref MAC_PATTERN: Regex = Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").unwrap();
}

/// A hardware address, always exactly six octets in the order they were written.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` and `AABB.CCDD.EEFF`,
    /// with hex digits in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = to_colon_form(s)?;
        let mut octets = [0u8; 6];
        for (dst, group) in octets.iter_mut().zip(canonical.split(':')) {
            *dst = u8::from_str_radix(group, 16).map_err(|_| Error::InvalidFormat(s.to_string()))?;
        }
        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

// Rewrites dot ("Cisco") and dash notation into colon notation, then checks it.
fn to_colon_form(input: &str) -> Result<String, Error> {
    let trimmed = input.trim();
    let rewritten = if trimmed.contains('.') {
        let mut out = String::with_capacity(17);
        for (i, c) in trimmed.chars().filter(|c| *c != '.').enumerate() {
            if i > 0 && i % 2 == 0 {
                out.push(':');
            }
            out.push(c);
        }
        out
    } else {
        trimmed.replace('-', ":")
    };
    if !MAC_PATTERN.is_match(&rewritten) {
        return Err(Error::InvalidFormat(input.to_string()));
    }
    Ok(rewritten)
}

/// Checks that `input` is an accepted MAC notation without decoding it.
pub fn validate(input: &str) -> Result<(), Error> {
    to_colon_form(input).map(|_| ())
}

/// Renders any accepted notation as uppercase `AA:BB:CC:DD:EE:FF`.
pub fn normalize(input: &str) -> Result<String, Error> {
    Ok(input.parse::<MacAddress>()?.to_string())
}

/// True only for the strict colon form, as found in the kernel ARP table.
pub fn is_colon_form(input: &str) -> bool {
    MAC_PATTERN.is_match(input)
}

#[cfg(test)]
mod tests {
    use crate::wol::mac::*;

    const AABB: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    macro_rules! test_parse_ok {
        ($name:ident, $s:expr, $o:expr) => {
            #[test]
            fn $name() {
                let mac: MacAddress = $s.parse().unwrap();
                assert_eq!(mac.octets(), $o);
            }
        };
    }

    macro_rules! test_parse_err {
        ($name:ident, $s:expr) => {
            #[test]
            fn $name() {
                match $s.parse::<MacAddress>() {
                    Err(Error::InvalidFormat(input)) => assert_eq!(input, $s),
                    other => panic!("expected InvalidFormat, got {:?}", other),
                }
                assert!(validate($s).is_err());
            }
        };
    }

    test_parse_ok! {colon_upper, "AA:BB:CC:DD:EE:FF", AABB}
    test_parse_ok! {colon_lower, "aa:bb:cc:dd:ee:ff", AABB}
    test_parse_ok! {dash, "AA-BB-CC-DD-EE-FF", AABB}
    test_parse_ok! {dot_upper, "AABB.CCDD.EEFF", AABB}
    test_parse_ok! {dot_lower, "aabb.ccdd.eeff", AABB}
    test_parse_ok! {surrounding_space, "  01:02:03:04:05:06\n", [1, 2, 3, 4, 5, 6]}
    test_parse_ok! {order_kept, "00:1a:2b:3c:4d:5e", [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]}

    test_parse_err! {five_groups, "AA:BB:CC:DD:EE"}
    test_parse_err! {five_groups_dash, "AA-BB-CC-DD-EE"}
    test_parse_err! {seven_groups, "AA:BB:CC:DD:EE:FF:00"}
    test_parse_err! {non_hex, "GG:BB:CC:DD:EE:FF"}
    test_parse_err! {wide_group, "AAA:BB:CC:DD:EE:FF"}
    test_parse_err! {narrow_group, "A:BB:CC:DD:EE:FF"}
    test_parse_err! {short_dot, "AABB.CCDD.EEF"}
    test_parse_err! {bare_word, "invalid"}
    test_parse_err! {empty, ""}

    #[test]
    fn test_notations_agree() {
        let colon: MacAddress = "12:34:56:78:9a:bc".parse().unwrap();
        let dash: MacAddress = "12-34-56-78-9A-BC".parse().unwrap();
        let dot: MacAddress = "1234.5678.9abc".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon, dot);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("aa:bb:cc:dd:ee:ff").unwrap(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize("aa-bb-cc-dd-ee-ff").unwrap(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize("aabb.ccdd.eeff").unwrap(), "AA:BB:CC:DD:EE:FF");
        assert!(normalize("invalid").is_err());
    }

    #[test]
    fn test_is_colon_form() {
        assert!(is_colon_form("aa:bb:cc:dd:ee:ff"));
        assert!(!is_colon_form("aa-bb-cc-dd-ee-ff"));
        assert!(!is_colon_form("<incomplete>"));
    }
}
