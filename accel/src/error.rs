#[derive(Debug)]
pub enum AccError {
    Already,
    InvalidParameter(&'static str),
    NotPresent { vendor_id: u16, product_id: u16 },
    Usb(nusb::Error),
    Transfer(nusb::transfer::TransferError),
    LengthMismatch { expected: usize, actual: usize },
    UnsupportedCompression,
    Parse,
    Accelerator(u8),
    MalformedReply,
}

/// The flat taxonomy every [AccError] maps to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation already happened on this handle
    Already,
    /// A precondition was violated by the caller
    InvalidParameter,
    /// No matching device
    NotPresent,
    /// Enumeration, claim or transfer failure
    Usb,
    /// Device failure not otherwise classified
    AcceleratorUnknown,
    /// Device rejected the compression scheme
    UnsupportedCompression,
    /// Device rejected the payload as malformed
    Parse,
}

const DEVICE_STATUS_OK: u8 = 0;
const DEVICE_STATUS_UNSUPPORTED_COMPRESSION: u8 = 1;
const DEVICE_STATUS_PARSE: u8 = 2;

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Already,
        ErrorKind::InvalidParameter,
        ErrorKind::NotPresent,
        ErrorKind::Usb,
        ErrorKind::AcceleratorUnknown,
        ErrorKind::UnsupportedCompression,
        ErrorKind::Parse,
    ];

    /// Negative result code used across the C interface
    pub const fn code(self) -> i32 {
        match self {
            ErrorKind::Already => -1,
            ErrorKind::InvalidParameter => -2,
            ErrorKind::NotPresent => -3,
            ErrorKind::Usb => -4,
            ErrorKind::AcceleratorUnknown => -100,
            ErrorKind::UnsupportedCompression => -101,
            ErrorKind::Parse => -102,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Already => "ALREADY",
            ErrorKind::InvalidParameter => "INVAL",
            ErrorKind::NotPresent => "NOTPRESENT",
            ErrorKind::Usb => "USB",
            ErrorKind::AcceleratorUnknown => "ACC_UNKNOWN",
            ErrorKind::UnsupportedCompression => "ACC_UNSUP_COMP",
            ErrorKind::Parse => "ACC_PARSE",
        }
    }
}

impl AccError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccError::Already => ErrorKind::Already,
            AccError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            AccError::NotPresent { .. } => ErrorKind::NotPresent,
            AccError::Usb(_)
            | AccError::Transfer(_)
            | AccError::LengthMismatch { .. } => ErrorKind::Usb,
            AccError::UnsupportedCompression => {
                ErrorKind::UnsupportedCompression
            }
            AccError::Parse => ErrorKind::Parse,
            AccError::Accelerator(_) | AccError::MalformedReply => {
                ErrorKind::AcceleratorUnknown
            }
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Interpret the status byte the device sends after a frame
    pub fn from_device_status(status: u8) -> Result<(), AccError> {
        match status {
            DEVICE_STATUS_OK => Ok(()),
            DEVICE_STATUS_UNSUPPORTED_COMPRESSION => {
                Err(AccError::UnsupportedCompression)
            }
            DEVICE_STATUS_PARSE => Err(AccError::Parse),
            other => Err(AccError::Accelerator(other)),
        }
    }
}

impl std::error::Error for AccError {}

impl std::fmt::Display for AccError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccError::Already => write!(f, "Operation already performed"),
            AccError::InvalidParameter(what) => {
                write!(f, "Invalid parameter: {}", what)
            }
            AccError::NotPresent {
                vendor_id,
                product_id,
            } => {
                write!(f, "No device {:04x}:{:04x}", vendor_id, product_id)
            }
            AccError::Usb(err) => write!(f, "USB error: {}", err),
            AccError::Transfer(err) => write!(f, "Transfer error: {}", err),
            AccError::LengthMismatch { expected, actual } => write!(
                f,
                "Transfer length mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            AccError::UnsupportedCompression => {
                write!(f, "Accelerator does not support the compression")
            }
            AccError::Parse => {
                write!(f, "Accelerator could not parse the payload")
            }
            AccError::Accelerator(status) => {
                write!(f, "Accelerator error: status {}", status)
            }
            AccError::MalformedReply => {
                write!(f, "Malformed reply from accelerator")
            }
        }
    }
}

impl From<nusb::Error> for AccError {
    fn from(err: nusb::Error) -> Self {
        AccError::Usb(err)
    }
}

impl From<nusb::transfer::TransferError> for AccError {
    fn from(err: nusb::transfer::TransferError) -> Self {
        AccError::Transfer(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nusb::transfer::TransferError;

    #[test]
    fn test_codes() {
        let codes: Vec<i32> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes, vec![-1, -2, -3, -4, -100, -101, -102]);
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(0), None);
        assert_eq!(ErrorKind::from_code(-5), None);
    }

    #[test]
    fn test_device_status() {
        assert!(AccError::from_device_status(0).is_ok());
        let kind = |status| {
            AccError::from_device_status(status).unwrap_err().kind()
        };
        assert_eq!(kind(1), ErrorKind::UnsupportedCompression);
        assert_eq!(kind(2), ErrorKind::Parse);
        assert_eq!(kind(3), ErrorKind::AcceleratorUnknown);
        assert_eq!(kind(0xff), ErrorKind::AcceleratorUnknown);
    }

    #[test]
    fn test_transport_failures_are_usb() {
        assert_eq!(
            AccError::from(TransferError::Stall).kind(),
            ErrorKind::Usb
        );
        assert_eq!(
            AccError::LengthMismatch {
                expected: 4,
                actual: 1
            }
            .code(),
            -4
        );
        assert_eq!(AccError::MalformedReply.code(), -100);
    }
}
