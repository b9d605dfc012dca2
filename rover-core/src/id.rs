//! Rover identity: logical peer id X and its canonical address 10.0.X.0.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Logical peer identifier (0-255). Canonical form is `10.0.X.0`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RoverId(pub u8);

impl RoverId {
    pub fn new(id: u8) -> Self {
        RoverId(id)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// The address this rover is known by in routing tables and transfer packets.
    pub fn to_ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, self.0, 0)
    }

    /// Inverse of [`RoverId::to_ipv4`]. Returns `None` for addresses outside the 10.0.X.0 scheme.
    pub fn from_ipv4(addr: Ipv4Addr) -> Option<Self> {
        match addr.octets() {
            [10, 0, x, 0] => Some(RoverId(x)),
            _ => None,
        }
    }
}

impl fmt::Display for RoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ipv4())
    }
}

impl From<u8> for RoverId {
    fn from(id: u8) -> Self {
        RoverId(id)
    }
}

/// Parse a rover id from either `X` or `10.0.X.0`.
impl FromStr for RoverId {
    type Err = ParseRoverIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Ok(RoverId(n));
        }
        let addr: Ipv4Addr = s
            .parse()
            .map_err(|_| ParseRoverIdError::Invalid(s.to_string()))?;
        RoverId::from_ipv4(addr).ok_or(ParseRoverIdError::OutsideScheme(addr))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseRoverIdError {
    #[error("invalid rover id: {0:?}")]
    Invalid(String),
    #[error("{0} is not a 10.0.X.0 rover address")]
    OutsideScheme(Ipv4Addr),
}
