use crate::AccError;

const DIRECTION_BIT: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

/// Endpoint address; bit 7 carries the direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint(u8);

impl Endpoint {
    /// Bulk-out endpoint of the accelerator
    pub const BULK_OUT: Endpoint = Endpoint::new(1, Direction::Out);
    /// Bulk-in endpoint of the accelerator
    pub const BULK_IN: Endpoint = Endpoint::new(1, Direction::In);

    pub const fn new(number: u8, direction: Direction) -> Self {
        let number = number & !DIRECTION_BIT;
        match direction {
            Direction::Out => Endpoint(number),
            Direction::In => Endpoint(number | DIRECTION_BIT),
        }
    }

    pub const fn from_address(address: u8) -> Self {
        Endpoint(address)
    }

    pub fn address(self) -> u8 {
        self.0
    }

    pub fn number(self) -> u8 {
        self.0 & !DIRECTION_BIT
    }

    pub fn direction(self) -> Direction {
        if self.0 & DIRECTION_BIT == 0 {
            Direction::Out
        } else {
            Direction::In
        }
    }

    /// Address of the endpoint if it points the expected way
    pub(crate) fn checked(self, direction: Direction) -> Result<u8, AccError> {
        if self.direction() == direction {
            Ok(self.0)
        } else {
            Err(AccError::InvalidParameter(match direction {
                Direction::Out => "bulk-out endpoint has the direction bit set",
                Direction::In => "bulk-in endpoint lacks the direction bit",
            }))
        }
    }
}

impl From<u8> for Endpoint {
    fn from(address: u8) -> Self {
        Endpoint::from_address(address)
    }
}

impl From<Endpoint> for u8 {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.address()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}
